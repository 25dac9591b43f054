//! Utility functions and helpers

use crate::{error::AppError, Result};
use chrono::NaiveDateTime;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Validate that an upload carries an allowed image extension
pub fn validate_file_extension(filename: &str, allowed: &[String]) -> bool {
    match Path::new(filename).extension() {
        Some(ext) => {
            let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
            allowed.iter().any(|a| a == &ext)
        }
        None => false,
    }
}

pub fn validate_file_size(file_size: u64, max_bytes: u64) -> bool {
    file_size <= max_bytes
}

/// Content-addressed filename: sha256 of the bytes plus the original
/// extension, so re-uploads of the same image land on the same path.
pub fn content_addressed_filename(data: &[u8], original_filename: &str) -> String {
    let digest = Sha256::digest(data);
    let ext = Path::new(original_filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default();
    format!("{}{}", hex::encode(digest), ext)
}

pub fn get_mime_type(filename: &str) -> String {
    match Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg".to_string(),
        Some("png") => "image/png".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

/// 8 uppercase hex characters, e.g. `A3F09B12`
pub fn generate_redemption_code() -> String {
    let bytes: [u8; 4] = rand::thread_rng().gen();
    hex::encode_upper(bytes)
}

/// Special-reward codes carry an `SR` prefix: `SRA3F09B12`
pub fn generate_special_reward_code() -> String {
    format!("SR{}", generate_redemption_code())
}

/// Codes are stored uppercase and compared case-insensitively
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Parse a receipt datetime as extracted by the vision model.
///
/// Accepts `DD/MM/YYYY` and `DD/MM/YYYY HH:MM`; the time component may
/// arrive in a separate `hora` field.
pub fn parse_ticket_datetime(fecha: &str, hora: Option<&str>) -> Option<NaiveDateTime> {
    let fecha = fecha.trim();
    if fecha.is_empty() {
        return None;
    }

    let combined = match hora.map(str::trim).filter(|h| !h.is_empty()) {
        Some(h) if !fecha.contains(' ') => format!("{} {}", fecha, h),
        _ => fecha.to_string(),
    };

    for format in ["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&combined, format) {
            return Some(dt);
        }
    }

    chrono::NaiveDate::parse_from_str(combined.split(' ').next().unwrap_or(""), "%d/%m/%Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn is_valid_email(email: &str) -> bool {
    email.contains('@') && email.len() > 5 && email.len() < 255
}

/// Parse an opaque id parameter into a UUID with a user-visible error
pub fn parse_uuid(raw: &str, what: &str) -> Result<uuid::Uuid> {
    raw.parse::<uuid::Uuid>()
        .map_err(|_| AppError::validation(format!("Invalid {} id", what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed() -> Vec<String> {
        vec![".jpg".to_string(), ".jpeg".to_string(), ".png".to_string()]
    }

    #[test]
    fn extension_validation() {
        assert!(validate_file_extension("ticket.jpg", &allowed()));
        assert!(validate_file_extension("TICKET.JPEG", &allowed()));
        assert!(validate_file_extension("a.b.png", &allowed()));
        assert!(!validate_file_extension("ticket.pdf", &allowed()));
        assert!(!validate_file_extension("noext", &allowed()));
    }

    #[test]
    fn content_addressing_is_stable() {
        let a = content_addressed_filename(b"bytes", "foto.JPG");
        let b = content_addressed_filename(b"bytes", "other.jpg");
        assert_eq!(a, b);
        assert!(a.ends_with(".jpg"));
        assert_eq!(a.len(), 64 + 4);
    }

    #[test]
    fn redemption_code_shape() {
        let code = generate_redemption_code();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_lowercase()));

        let special = generate_special_reward_code();
        assert!(special.starts_with("SR"));
        assert_eq!(special.len(), 10);
    }

    #[test]
    fn code_normalization() {
        assert_eq!(normalize_code(" abcdef12 "), "ABCDEF12");
        assert_eq!(normalize_code("ABCDEF12"), "ABCDEF12");
    }

    #[test]
    fn ticket_datetime_formats() {
        let d = parse_ticket_datetime("15/03/2025", None).unwrap();
        assert_eq!(d.format("%Y-%m-%d %H:%M").to_string(), "2025-03-15 00:00");

        let dt = parse_ticket_datetime("15/03/2025 18:42", None).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "18:42");

        let dt = parse_ticket_datetime("15/03/2025", Some("18:42")).unwrap();
        assert_eq!(dt.format("%H:%M").to_string(), "18:42");

        assert!(parse_ticket_datetime("2025-03-15", None).is_none());
        assert!(parse_ticket_datetime("", Some("18:42")).is_none());
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(get_mime_type("a.jpg"), "image/jpeg");
        assert_eq!(get_mime_type("a.png"), "image/png");
        assert_eq!(get_mime_type("a.bin"), "application/octet-stream");
    }
}
