use std::fmt;

/// A parameter.
///
/// This struct represents a parameter in a SIP message,
/// consisting of a name and an optional value. A parameter
/// with an empty value (`;lr`) is distinct from an absent one.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Param {
    /// The parameter name.
    pub name: String,

    /// The parameter optional value.
    pub value: Option<String>,
}

impl Param {
    /// Creates a new `Param` from a name and an optional value.
    pub fn new<N: Into<String>>(name: N, value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value: value.map(|v| v.to_string()),
        }
    }
}

/// An ordered collection of SIP parameters.
///
/// A parameter takes the form `name=value` and can appear in a SIP
/// message as either a URI parameter or a header parameter. Name
/// lookup is case-insensitive; insertion order is preserved on
/// serialization.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct Params(Vec<Param>);

impl Params {
    /// Creates an empty `Params` list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Gets the value of a parameter by name.
    ///
    /// Returns the value associated with the given name, if it exists.
    /// The outer `Option` distinguishes a missing parameter from a
    /// present parameter without a value.
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.0
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.value.as_deref())
    }

    /// Returns `true` if a parameter with the given name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = &Param> {
        self.0.iter()
    }

    /// Pushes a name-value parameter pair.
    pub fn push(&mut self, param: Param) {
        self.0.push(param)
    }

    /// Checks if the parameter list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for Param { name, value } in &self.0 {
            if !first {
                write!(f, ";")?;
            }
            first = false;
            match value {
                Some(value) => write!(f, "{}={}", name, value)?,
                None => write!(f, "{}", name)?,
            }
        }
        Ok(())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Params {
    fn from(params: [(&str, &str); N]) -> Self {
        Self(
            params
                .iter()
                .map(|(name, value)| Param::new(*name, Some(value)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let params = Params::from([("Transport", "udp")]);

        assert_eq!(params.get("transport"), Some(Some("udp")));
        assert_eq!(params.get("TRANSPORT"), Some(Some("udp")));
        assert_eq!(params.get("ttl"), None);
    }

    #[test]
    fn test_empty_value_is_distinct_from_absent() {
        let mut params = Params::new();
        params.push(Param::new("lr", None));

        assert_eq!(params.get("lr"), Some(None));
        assert_eq!(params.get("maddr"), None);
    }

    #[test]
    fn test_display_preserves_order() {
        let mut params = Params::new();
        params.push(Param::new("b", Some("2")));
        params.push(Param::new("lr", None));
        params.push(Param::new("a", Some("1")));

        assert_eq!(params.to_string(), "b=2;lr;a=1");
    }
}
