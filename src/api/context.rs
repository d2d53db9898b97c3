use super::constants::DEFAULT_LOCALE;
use uuid::Uuid;

/// Identifiers and locale attached to every call made by a proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    /// Fixed request id; a fresh one is generated per call when unset
    pub request_id: Option<Uuid>,
    pub locale: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            request_id: None,
            locale: DEFAULT_LOCALE.to_string(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Request id for the next call. Retries of one call reuse the returned id.
    pub fn request_id_for_call(&self) -> Uuid {
        self.request_id.unwrap_or_else(Uuid::new_v4)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_request_id_per_call() {
        let context = RequestContext::new();
        assert_ne!(context.request_id_for_call(), context.request_id_for_call());
        assert_eq!(context.locale, "en-US");
    }

    #[test]
    fn test_fixed_ids() {
        let correlation = Uuid::new_v4();
        let request = Uuid::new_v4();
        let context = RequestContext::new()
            .with_correlation_id(correlation)
            .with_request_id(request)
            .with_locale("fr-FR");

        assert_eq!(context.correlation_id, correlation);
        assert_eq!(context.request_id_for_call(), request);
        assert_eq!(context.request_id_for_call(), request);
        assert_eq!(context.locale, "fr-FR");
    }
}
