use serde::Serialize;
use log::error;

use crate::mail_reader::PageResult;

/// Pretty JSON, or `None` (logged) if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string_pretty(value) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Error converting to JSON: {}", e);
            None
        }
    }
}

pub fn display_page(page: &PageResult) {
    if let Some(json) = to_json(page) {
        println!("{}", json);
    }
}

pub fn display_count(total: usize) {
    println!("{}", serde_json::json!({ "total": total }));
}
