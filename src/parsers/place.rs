//! Free-text place splitting: "City, ST[, Country]".

/// Parsed place-of-performance fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Place {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

/// Country used when the source omits one.
pub const DEFAULT_COUNTRY: &str = "USA";

/// Split `"Austin, TX"` into city/state/country. The country defaults to
/// [`DEFAULT_COUNTRY`] whenever any place component parsed; blank input
/// yields all-`None`.
pub fn parse(text: &str) -> Place {
    let parts: Vec<&str> = text
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    match parts.as_slice() {
        [] => Place::default(),
        [city] => Place {
            city: Some((*city).to_string()),
            state: None,
            country: Some(DEFAULT_COUNTRY.to_string()),
        },
        [city, state] => Place {
            city: Some((*city).to_string()),
            state: Some((*state).to_string()),
            country: Some(DEFAULT_COUNTRY.to_string()),
        },
        [city, state, country, ..] => Place {
            city: Some((*city).to_string()),
            state: Some((*state).to_string()),
            country: Some((*country).to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn city_state_defaults_country() {
        let p = parse("Austin, TX");
        assert_eq!(p.city.as_deref(), Some("Austin"));
        assert_eq!(p.state.as_deref(), Some("TX"));
        assert_eq!(p.country.as_deref(), Some("USA"));
    }

    #[test]
    fn explicit_country_wins() {
        let p = parse("Stuttgart, BW, Germany");
        assert_eq!(p.country.as_deref(), Some("Germany"));
    }

    #[test]
    fn bare_token_is_a_city() {
        let p = parse("Washington");
        assert_eq!(p.city.as_deref(), Some("Washington"));
        assert_eq!(p.state, None);
        assert_eq!(p.country.as_deref(), Some("USA"));
    }

    #[test]
    fn blank_input_degrades_to_none() {
        assert_eq!(parse(""), Place::default());
        assert_eq!(parse("  ,  "), Place::default());
    }
}
