//! `${name}` template interpolation for alert and recovery messages.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::monitor::state::EventData;

/// Alert template used when a monitor sets no `text`.
pub const DEFAULT_ALERT_TEMPLATE: &str = "${name} triggered on ${host}";
/// Recovery template used when a monitor sets no `recover`.
pub const DEFAULT_RECOVER_TEMPLATE: &str = "${name} recovered on ${host}";

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(.*?)\}").expect("template token pattern is valid"));

/// Replace every `${key}` with its value in `data`, or nothing if absent.
#[must_use]
pub fn render(template: &str, data: &EventData) -> String {
    TOKEN
        .replace_all(template, |caps: &Captures<'_>| {
            data.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_ALERT_TEMPLATE, render};
    use crate::monitor::state::EventData;

    fn data(pairs: &[(&str, &str)]) -> EventData {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_keys() {
        let data = data(&[("name", "disk"), ("host", "h1")]);
        assert_eq!(render("${name} on ${host}", &data), "disk on h1");
        assert_eq!(render(DEFAULT_ALERT_TEMPLATE, &data), "disk triggered on h1");
    }

    #[test]
    fn missing_keys_become_empty() {
        assert_eq!(render("${x}", &EventData::new()), "");
        assert_eq!(render("a${}b", &EventData::new()), "ab");
    }

    #[test]
    fn unterminated_tokens_stay_literal() {
        let data = data(&[("name", "load")]);
        assert_eq!(render("${name} ${oops", &data), "load ${oops");
        assert_eq!(render("$name", &data), "$name");
    }
}
