// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress scraping for the external tool's text output.

use regex::Regex;
use std::sync::LazyLock;

/// A number (integer or decimal) directly followed by `%`.
static PERCENT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("percent token regex"));

/// Extract a progress percentage from one line of tool output.
///
/// The last percent token on the line wins; its numeric part is truncated
/// toward zero. Lines without a parseable token yield `None`.
///
/// ```
/// use streammux::progress::parse_progress_line;
///
/// assert_eq!(parse_progress_line("[download]  42.5% of 10.00MiB"), Some(42));
/// assert_eq!(parse_progress_line("[Merger] Merging formats into \"a.mp4\""), None);
/// ```
pub fn parse_progress_line(line: &str) -> Option<u32> {
    PERCENT_TOKEN
        .captures_iter(line)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .last()
        .map(|value| value.trunc().min(u32::MAX as f64) as u32)
}
