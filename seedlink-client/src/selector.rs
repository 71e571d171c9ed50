//! Rewrite v3-style 3-character selectors into v4's underscore-delimited form.
//!
//! v3 selectors pack location/channel/type into fixed 3-character codes
//! (`"BHZ"`, `"00BHZ.D"`); v4 splits them into `LOC_BAND_SOURCE_SUBSOURCE`
//! fields joined by `_`, each of which may be `?` for wildcard. Only called
//! when a session gets promoted to v4 after the caller already supplied a
//! v3-form selector.

/// Rewrite one v3 selector into its v4 equivalent.
///
/// v3 selector grammar: `[LL]CCC[.T]` where `LL` is an optional 2-character
/// location code, `CCC` is the 3-character channel (band/source/subsource),
/// and `.T` is an optional 1-character type suffix dropped in v4 (type
/// filtering moved to a separate mechanism).
pub fn rewrite_v3_to_v4(selector: &str) -> String {
    let body = selector.split('.').next().unwrap_or(selector);
    let (location, channel) = match body.len() {
        5 => (&body[0..2], &body[2..5]),
        3 => ("", body),
        _ => return selector.to_owned(),
    };

    let mut band = channel.chars().next().unwrap_or('?').to_string();
    let mut source = channel.chars().nth(1).unwrap_or('?').to_string();
    let mut subsource = channel.chars().nth(2).unwrap_or('?').to_string();
    for field in [&mut band, &mut source, &mut subsource] {
        if field == "?" {
            *field = "?".to_owned();
        }
    }

    if location.is_empty() {
        format!("{band}_{source}_{subsource}")
    } else {
        format!("{location}_{band}_{source}_{subsource}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_channel_no_location() {
        assert_eq!(rewrite_v3_to_v4("BHZ"), "B_H_Z");
    }

    #[test]
    fn channel_with_location() {
        assert_eq!(rewrite_v3_to_v4("00BHZ"), "00_B_H_Z");
    }

    #[test]
    fn type_suffix_dropped() {
        assert_eq!(rewrite_v3_to_v4("BHZ.D"), "B_H_Z");
    }

    #[test]
    fn wildcard_channel() {
        assert_eq!(rewrite_v3_to_v4("BH?"), "B_H_?");
    }

    #[test]
    fn unrecognized_length_passes_through() {
        assert_eq!(rewrite_v3_to_v4("*"), "*");
    }
}
