//! HTML rendering for the upload page.

use captionist_core::enhance::DEFAULT_PURPOSE;
use captionist_core::CaptionOutcome;

/// Everything the page shows for one response.
#[derive(Debug, Default)]
pub struct PageView {
    pub caption: Option<String>,
    pub original_caption: Option<String>,
    pub image_url: Option<String>,
    pub error: Option<String>,
    pub prompt: String,
    pub purpose: String,
}

impl PageView {
    /// The empty form.
    pub fn form() -> Self {
        Self {
            purpose: DEFAULT_PURPOSE.to_string(),
            ..Self::default()
        }
    }

    /// The form with only an error line.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::form()
        }
    }

    /// The page for a handled request, echoing back the submitted text fields.
    pub fn from_outcome(outcome: &CaptionOutcome, prompt: &str, purpose: &str) -> Self {
        let mut view = Self {
            caption: outcome.caption().map(str::to_string),
            error: outcome.message(),
            prompt: prompt.to_string(),
            purpose: if purpose.trim().is_empty() {
                DEFAULT_PURPOSE.to_string()
            } else {
                purpose.to_string()
            },
            ..Self::default()
        };

        if let CaptionOutcome::Captioned(result) = outcome {
            view.original_caption = result.original_caption.clone();
            view.image_url = Some(result.image_url.clone());
        }

        view
    }
}

/// Render the full page.
pub fn render(view: &PageView) -> String {
    let mut body = String::new();

    if let Some(error) = &view.error {
        body.push_str(&format!(
            "    <p class=\"error\">{}</p>\n",
            escape_html(error)
        ));
    }

    if let Some(url) = &view.image_url {
        body.push_str(&format!(
            "    <img src=\"{}\" alt=\"Uploaded image\">\n",
            escape_html(url)
        ));
    }

    if let Some(caption) = &view.caption {
        body.push_str(&format!(
            "    <h2>Caption</h2>\n    <p class=\"caption\">{}</p>\n",
            escape_html(caption)
        ));
    }

    if let Some(original) = &view.original_caption {
        body.push_str(&format!(
            "    <h3>Original caption</h3>\n    <p class=\"original\">{}</p>\n",
            escape_html(original)
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>Captionist</title>
  <style>
    body {{ font-family: sans-serif; max-width: 720px; margin: 2rem auto; padding: 0 1rem; }}
    label {{ display: block; margin-top: 1rem; }}
    input[type=text] {{ width: 100%; }}
    img {{ max-width: 100%; margin-top: 1.5rem; }}
    .error {{ color: #b00020; }}
    .original {{ color: #555; font-style: italic; }}
  </style>
</head>
<body>
  <h1>Image Caption Generator</h1>
  <form method="post" action="/" enctype="multipart/form-data">
    <label>Image <input type="file" name="image" accept=".png,.jpg,.jpeg,.gif"></label>
    <label>Prompt (optional) <input type="text" name="prompt" value="{prompt}" placeholder="a photograph of"></label>
    <label>Purpose <input type="text" name="gpt_purpose" value="{purpose}"></label>
    <button type="submit">Generate caption</button>
  </form>
  <section>
{body}  </section>
</body>
</html>
"#,
        prompt = escape_html(&view.prompt),
        purpose = escape_html(&view.purpose),
        body = body,
    )
}

/// Escape text for HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
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
