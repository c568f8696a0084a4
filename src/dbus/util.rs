/// Default text rendering of a path value
pub fn format_text_value(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => String::new(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => val.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_by_value_kind() {
        assert_eq!(format_text_value(&json!(3.456)), "3.456");
        assert_eq!(format_text_value(&json!(55.0)), "55.0");
        assert_eq!(format_text_value(&json!(16)), "16");
        assert_eq!(format_text_value(&json!("CVL Optimizer")), "CVL Optimizer");
        assert_eq!(format_text_value(&json!(true)), "true");
        assert_eq!(format_text_value(&serde_json::Value::Null), "");
    }
}
