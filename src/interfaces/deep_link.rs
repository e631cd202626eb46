use crate::domain::flow::ResumeSignal;
use crate::error::FlowError;
use url::Url;

/// Turns the URL the gateway redirected back to into a [`ResumeSignal`].
///
/// The consent id arrives as `cid` (or `consent_id`); a declined or
/// cancelled authorisation adds `error` and optionally `error_description`.
pub fn parse_return_url(raw: &str) -> Result<ResumeSignal, FlowError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| FlowError::Validation(format!("invalid return URL: {e}")))?;

    let mut signal = ResumeSignal::default();
    for (key, value) in url.query_pairs() {
        let value = value.into_owned();
        if value.is_empty() {
            continue;
        }
        match key.as_ref() {
            "cid" | "consent_id" => signal.consent_id = Some(value),
            "error" => signal.error = Some(value),
            "error_description" => signal.error_description = Some(value),
            _ => {}
        }
    }
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_consent_id() {
        let signal = parse_return_url("consentpay://return?cid=c1").unwrap();
        assert_eq!(signal, ResumeSignal::for_consent("c1"));

        let signal = parse_return_url("https://shop.example/paid?consent_id=c2&x=1").unwrap();
        assert_eq!(signal.consent_id.as_deref(), Some("c2"));
    }

    #[test]
    fn test_parse_error_payload() {
        let signal = parse_return_url(
            "consentpay://return?cid=c1&error=access_denied&error_description=User%20cancelled",
        )
        .unwrap();
        assert_eq!(
            signal,
            ResumeSignal::for_consent("c1")
                .with_error("access_denied", Some("User cancelled".to_string()))
        );
    }

    #[test]
    fn test_missing_id_and_garbage() {
        let signal = parse_return_url("consentpay://return?cid=").unwrap();
        assert_eq!(signal.consent_id, None);
        assert!(parse_return_url("not a url").is_err());
    }
}
