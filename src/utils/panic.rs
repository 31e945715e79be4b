use std::any::Any;

/// Render a caught panic payload for logging.
pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_panic_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(describe_panic(literal.as_ref()), "boom");

        let formatted: Box<dyn Any + Send> = Box::new(format!("bad id {}", 7));
        assert_eq!(describe_panic(formatted.as_ref()), "bad id 7");

        let other: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(describe_panic(other.as_ref()), "non-string panic payload");
    }
}
