/// Correlation handle attached to a connection, typically set by the
/// authorize hook. `id` and `key` are set independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    id: Option<i64>,
    key: Option<String>,
}

impl Identity {
    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn set_key(&mut self, key: impl Into<String>) {
        self.key = Some(key.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_are_independent() {
        let mut identity = Identity::default();
        assert!(!identity.has_id());
        assert!(!identity.has_key());

        identity.set_key("teamA");
        assert!(identity.has_key());
        assert!(!identity.has_id());
        assert_eq!(identity.key(), Some("teamA"));

        identity.set_id(0);
        assert!(identity.has_id());
        assert_eq!(identity.id(), Some(0));
    }
}
