use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::NaiveDateTime;
use base64::{engine::general_purpose, Engine as _};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub date: NaiveDateTime,
    pub location: String,
    pub price: f64,
    pub available_tickets: i32,
    pub image_base64: Option<String>,
}

/// Изменяемые поля события: используются и при создании, и при обновлении.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    #[validate(length(min = 1, max = 200, message = "title не должен быть пустым"))]
    pub title: String,
    pub date: NaiveDateTime,
    #[validate(length(min = 1, max = 200, message = "location не должен быть пустым"))]
    pub location: String,
    #[validate(range(min = 0.0, message = "price должна быть >= 0"))]
    pub price: f64,
    #[validate(range(min = 0, message = "availableTickets должен быть >= 0"))]
    pub available_tickets: i32,
    #[validate(custom(function = "validate_base64"))]
    pub image_base64: Option<String>,
}

// Картинка хранится текстом, но это должен быть корректный base64
fn validate_base64(value: &str) -> Result<(), ValidationError> {
    let payload = match value.split_once(";base64,") {
        Some((_, data)) => data,
        None => value,
    };
    general_purpose::STANDARD
        .decode(payload.trim())
        .map(|_| ())
        .map_err(|_| ValidationError::new("base64").with_message("imageBase64 не является base64".into()))
}

impl EventInput {
    pub fn into_event(self, id: String) -> Event {
        Event {
            id,
            title: self.title,
            date: self.date,
            location: self.location,
            price: self.price,
            available_tickets: self.available_tickets,
            image_base64: self.image_base64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> EventInput {
        serde_json::from_value(serde_json::json!({
            "title": "Jazz Night",
            "date": "2025-03-14T20:00:00",
            "location": "Kandy",
            "price": 1500.0,
            "availableTickets": 120,
            "imageBase64": "aGVsbG8="
        }))
        .unwrap()
    }

    #[test]
    fn valid_input_passes() {
        assert!(input().validate().is_ok());

        let mut data_url = input();
        data_url.image_base64 = Some("data:image/png;base64,aGVsbG8=".into());
        assert!(data_url.validate().is_ok());
    }

    #[test]
    fn negative_inventory_and_bad_image_are_rejected() {
        let mut negative = input();
        negative.available_tickets = -1;
        assert!(negative.validate().is_err());

        let mut image = input();
        image.image_base64 = Some("not base64 at all!".into());
        assert!(image.validate().is_err());

        let mut blank = input();
        blank.title = String::new();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn event_serializes_camel_case() {
        let event = input().into_event("E00-001".into());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["availableTickets"], 120);
        assert_eq!(json["id"], "E00-001");
    }
}
