//! Outbound HTTP request bodies.

use serde::{Deserialize, Serialize};

/// Form data that starts a divination process.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DivinationFormData {
    pub name: String,
    pub date_of_birth: String,
    pub favorite_color: String,
    pub favorite_number: String,
    pub relationship_status: String,
}

/// BLIK payment submission for a running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlikPaymentRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "processId")]
    pub process_id: String,
    #[serde(rename = "BLIKCode")]
    pub blik_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blik_request_uses_backend_field_names() {
        let request = BlikPaymentRequest {
            user_id: "u1".to_string(),
            process_id: "p1".to_string(),
            blik_code: "123456".to_string(),
        };

        assert_eq!(
            serde_json::to_value(&request).expect("serialize"),
            json!({"userId": "u1", "processId": "p1", "BLIKCode": "123456"})
        );
    }

    #[test]
    fn form_data_is_camel_case() {
        let form = DivinationFormData {
            name: "Ada".to_string(),
            date_of_birth: "1990-01-01".to_string(),
            favorite_color: "violet".to_string(),
            favorite_number: "7".to_string(),
            relationship_status: "single".to_string(),
        };

        let value = serde_json::to_value(&form).expect("serialize");
        assert_eq!(value["dateOfBirth"], json!("1990-01-01"));
        assert_eq!(value["favoriteColor"], json!("violet"));
        assert_eq!(value["relationshipStatus"], json!("single"));
    }
}
