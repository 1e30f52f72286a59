//! Identity and filter resolution from decoded properties.
//!
//! Sits between the payload decoder and the state machine: given the decoded
//! properties of one record, decide the whitelisted identity (if any) and
//! whether the record passes the configured property filter. Decoder failure
//! is handled here by resolving from the absence of properties, so the
//! degrade path is an explicit branch rather than a swallowed exception.

use crate::config::FilterSpec;
use crate::decoding::{DecodeError, DecodedProperties, PropertyValue};

/// The resolved identity and filter verdict for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Whitelisted device id, when one was decoded
    pub whitelisted_id: Option<String>,
    /// Whether the record passes the configured filter
    pub passes_filter: bool,
}

/// Resolve identity and filter verdict from a decode result.
///
/// A decode failure yields no whitelist match and a failed filter; the
/// record can still continue an existing session.
pub fn resolve(
    decoded: Result<DecodedProperties, DecodeError>,
    whitelist: &[String],
    filter: &FilterSpec,
) -> Resolution {
    match decoded {
        Ok(props) => Resolution {
            whitelisted_id: resolve_whitelist(&props, whitelist).map(str::to_string),
            passes_filter: passes_filter(&props, filter),
        },
        Err(_) => Resolution {
            whitelisted_id: None,
            passes_filter: false,
        },
    }
}

/// First decoded device id that appears in the whitelist, scanning the
/// decoded ids in order. `None` if the whitelist is empty or nothing matches.
pub fn resolve_whitelist<'a>(
    props: &'a DecodedProperties,
    whitelist: &[String],
) -> Option<&'a str> {
    if whitelist.is_empty() {
        return None;
    }
    props
        .device_ids()
        .iter()
        .find(|id| whitelist.iter().any(|w| w == *id))
        .map(String::as_str)
}

/// Apply the property filter. An empty filter accepts every record.
///
/// Configured properties are ORed: the first one that matches admits the
/// record. List-valued properties match when any accepted id occurs in the
/// record's list; scalar properties match on exact equality.
pub fn passes_filter(props: &DecodedProperties, filter: &FilterSpec) -> bool {
    if filter.is_empty() {
        return true;
    }

    for (name, accepted) in &filter.properties {
        match props.values.get(name) {
            Some(PropertyValue::List(items)) => {
                if items.iter().any(|item| accepted.accepts(item)) {
                    return true;
                }
            }
            Some(PropertyValue::Text(value)) => {
                if accepted.accepts(value) {
                    return true;
                }
            }
            None => {}
        }
    }
    false
}
