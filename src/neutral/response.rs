use std::collections::BTreeMap;

use super::request::HttpMethod;

/// The response record returned by the API bundle.
#[derive(Debug, Clone)]
pub struct NeutralResponse {
    /// HTTP status, `100..=599`.
    pub status: u16,
    /// Headers to append onto the outgoing response (never replace
    /// existing ones set upstream).
    pub headers: BTreeMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
    /// Content type, if any.
    pub content_type: Option<String>,
}

impl NeutralResponse {
    /// Builds a response with an empty body and no content type.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: Vec::new(),
            content_type: None,
        }
    }

    /// Builds a plain-text response.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into().into_bytes(),
            content_type: Some("text/plain".to_string()),
        }
    }

    /// Applies the HEAD rule: body is replaced with the empty sequence and
    /// content type is suppressed, headers and status are unchanged.
    pub fn for_method(mut self, method: HttpMethod) -> Self {
        if method == HttpMethod::Head {
            self.body.clear();
            self.content_type = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_strips_body_and_content_type_but_keeps_status_and_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("x-trace".to_string(), "1".to_string());
        let response = NeutralResponse {
            status: 200,
            headers: headers.clone(),
            body: b"hello".to_vec(),
            content_type: Some("text/plain".to_string()),
        }
        .for_method(HttpMethod::Head);

        assert_eq!(response.status, 200);
        assert_eq!(response.headers, headers);
        assert!(response.body.is_empty());
        assert_eq!(response.content_type, None);
    }

    #[test]
    fn get_is_left_untouched() {
        let response = NeutralResponse::text(200, "ok").for_method(HttpMethod::Get);
        assert_eq!(response.body, b"ok");
        assert_eq!(response.content_type, Some("text/plain".to_string()));
    }
}
