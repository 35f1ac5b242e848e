//! Web page fetching with readable-text extraction.

use std::time::Duration;

/// Fetch timeout per the host's resource model.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on extracted page text.
const MAX_CONTENT_CHARS: usize = 8_000;

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

/// Fetch a URL and return its title plus up to 8,000 chars of readable
/// text (scripts, styles, and navigation markup stripped).
///
/// HTTP and connect failures are network errors for the caller to wrap;
/// this function never panics on odd content types.
pub async fn browse_url(url: &str) -> Result<String, String> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(3))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| e.to_string())?;

    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {} fetching {url}", response.status().as_u16()));
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();
    let body = response.text().await.map_err(|e| e.to_string())?;

    let (title, text) = if content_type.contains("html") || looks_like_html(&body) {
        (extract_title(&body), html_to_text(&body))
    } else {
        (None, body)
    };

    let mut content = text.trim().to_owned();
    if content.is_empty() {
        content = "No textual content found.".to_owned();
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        content = content.chars().take(MAX_CONTENT_CHARS).collect();
        content.push_str("\n...[Content Truncated]");
    }

    let title = title.unwrap_or_else(|| "No Title".to_owned());
    Ok(format!("Title: {title}\nURL: {url}\n\n{content}"))
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with("<!DOCTYPE") || head.starts_with("<html") || head.starts_with("<HTML")
}

fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let start = lower.find("<title")?;
    let open_end = html[start..].find('>')? + start + 1;
    let close = lower[open_end..].find("</title>")? + open_end;
    let title = html[open_end..close].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_owned())
    }
}

/// Strip non-content markup, then convert to plain text.
fn html_to_text(html: &str) -> String {
    let stripped = strip_blocks(html, &["script", "style", "nav", "footer", "header", "noscript", "iframe"]);
    html2text::from_read(stripped.as_bytes(), 100)
}

/// Remove `<tag>...</tag>` blocks for each listed tag, case-insensitive.
fn strip_blocks(html: &str, tags: &[&str]) -> String {
    let mut result = html.to_owned();
    for tag in tags {
        loop {
            let lower = result.to_lowercase();
            let open_pat = format!("<{tag}");
            let close_pat = format!("</{tag}>");
            let Some(start) = lower.find(&open_pat) else {
                break;
            };
            let end = match lower[start..].find(&close_pat) {
                Some(rel) => start + rel + close_pat.len(),
                // Unclosed tag: cut to the end to stay on the safe side.
                None => result.len(),
            };
            result.replace_range(start..end, "");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_blocks_removes_scripts_and_nav() {
        let html = "<html><head><script>var x=1;</script></head>\
                    <body><nav>Menu</nav><p>Real content</p></body></html>";
        let out = strip_blocks(html, &["script", "nav"]);
        assert!(!out.contains("var x"));
        assert!(!out.contains("Menu"));
        assert!(out.contains("Real content"));
    }

    #[test]
    fn strip_blocks_is_case_insensitive() {
        let html = "<SCRIPT>evil()</SCRIPT><p>ok</p>";
        let out = strip_blocks(html, &["script"]);
        assert!(!out.contains("evil"));
    }

    #[test]
    fn strip_blocks_handles_unclosed_tag() {
        let html = "<p>before</p><script>dangling";
        let out = strip_blocks(html, &["script"]);
        assert!(out.contains("before"));
        assert!(!out.contains("dangling"));
    }

    #[test]
    fn extract_title_finds_title_tag() {
        let html = "<html><head><title> My Page </title></head></html>";
        assert_eq!(extract_title(html).as_deref(), Some("My Page"));
        assert_eq!(extract_title("<html></html>"), None);
    }

    #[test]
    fn html_to_text_strips_tags() {
        let html = "<html><body><h1>Hello</h1><p>World</p></body></html>";
        let text = html_to_text(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }
}
