//! Extraction of values embedded in inline JavaScript
//!
//! The self-service API pages of the health ministry configure their client
//! through an inline script of the form
//!
//! ```text
//! var user_config = { "url": "/cnes/estabelecimentos", ... };
//! ```
//!
//! Contract of [`find_embedded_url`]:
//! - only script blocks containing [`USER_CONFIG_TOKEN`] are considered;
//! - inside such a block, lines are scanned starting at the line holding the
//!   token, and the first line containing [`URL_KEY`] wins;
//! - the value runs from just after [`URL_KEY`] to the next unescaped `"`;
//!   `\"` and `\/` escapes are unescaped;
//! - an empty or unterminated value is a failure (`None`).

/// Token identifying the configuration script
pub const USER_CONFIG_TOKEN: &str = "var user_config";

/// Opening delimiter of the URL value
pub const URL_KEY: &str = "\"url\": \"";

/// Return the value that starts after `open` and ends at the next unescaped `"`
///
/// Returns `None` when `open` is absent, the value is unterminated, or empty.
pub fn extract_quoted_after(text: &str, open: &str) -> Option<String> {
    let start = text.find(open)? + open.len();
    let mut value = String::new();
    let mut chars = text[start..].chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                '"' => value.push('"'),
                '/' => value.push('/'),
                '\\' => value.push('\\'),
                other => {
                    value.push('\\');
                    value.push(other);
                }
            },
            '"' => return (!value.is_empty()).then_some(value),
            other => value.push(other),
        }
    }

    None
}

/// Find the API path configured in a `var user_config` script block
pub fn find_embedded_url<'a, I>(scripts: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    scripts
        .into_iter()
        .filter(|code| code.contains(USER_CONFIG_TOKEN))
        .find_map(|code| {
            code.lines()
                .skip_while(|line| !line.contains(USER_CONFIG_TOKEN))
                .find(|line| line.contains(URL_KEY))
                .and_then(|line| extract_quoted_after(line, URL_KEY))
        })
}
