//! Admin page markup

use crate::button::ButtonId;
use crate::mapping::MappingSnapshot;

/// Status line shown above the form after a submission
pub struct Notice {
    pub ok: bool,
    pub text: String,
}

/// Render the remapping page for the given mapping
pub fn render(mapping: &MappingSnapshot, notice: Option<&Notice>, simulated: bool) -> String {
    let mut current = String::new();
    let mut options = String::new();
    for button in ButtonId::ALL {
        current.push_str(&format!(
            "      <li>{}: {} <small>({})</small></li>\n",
            button.label(),
            escape_html(&mapping.get(button).to_hex()),
            escape_html(&mapping.get(button).describe()),
        ));
        options.push_str(&format!(
            "        <option value=\"{}\">{}</option>\n",
            button.as_str(),
            button.label()
        ));
    }

    let notice = match notice {
        Some(n) => format!(
            "    <p class=\"{}\">{}</p>\n",
            if n.ok { "ok" } else { "err" },
            escape_html(&n.text)
        ),
        None => String::new(),
    };

    let backend = if simulated {
        "    <p><small>Buttons are simulated: POST /api/simulate/&lt;button&gt; to press one.</small></p>\n"
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Preset Gateway</title>
    <style>
      body {{ font-family: sans-serif; margin: 2em; }}
      .ok {{ color: #2a7a2a; }}
      .err {{ color: #b02a2a; }}
    </style>
  </head>
  <body>
    <h1>Preset Gateway</h1>
{notice}    <h2>Current mapping (revision {revision})</h2>
    <ul>
{current}    </ul>
    <form method="post" action="/update">
      <select name="button">
{options}      </select>
      <input type="text" name="hex_value" placeholder="C0 01">
      <button type="submit">Update</button>
    </form>
{backend}  </body>
</html>
"#,
        notice = notice,
        revision = mapping.revision,
        current = current,
        options = options,
        backend = backend,
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
