//! Small display and time helpers shared by the client and the CLI.

use chrono::Utc;

pub const APP_NAME: &str = "lumio_client";

pub fn print_banner() {
    println!("lumio {} ({APP_NAME})", env!("CARGO_PKG_VERSION"));
}

pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// `0x1234...abcd` style shortening; short inputs are returned unchanged.
pub fn format_address(address: &str) -> String {
    if address.len() < 13 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

/// Renders a social handle, falling back to the first address characters.
pub fn display_handle(social_handle: Option<&str>, address: &str) -> String {
    match social_handle.map(str::trim).filter(|handle| !handle.is_empty()) {
        Some(handle) if handle.starts_with('@') => handle.to_string(),
        Some(handle) => format!("@{handle}"),
        None => {
            let short = format_address(address).replacen("0x", "", 1);
            format!("@{}", short.chars().take(8).collect::<String>())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortens_long_addresses() {
        let address = format!("0x{}", "ab".repeat(32));
        assert_eq!(format_address(&address), "0xabab...abab");
        assert_eq!(format_address("0x1234"), "0x1234");
    }

    #[test]
    fn handle_falls_back_to_address() {
        let address = format!("0x{}", "12".repeat(32));
        assert_eq!(display_handle(Some("vibes"), &address), "@vibes");
        assert_eq!(display_handle(Some("@vibes"), &address), "@vibes");
        assert_eq!(display_handle(None, &address), "@1212...1");
        assert_eq!(display_handle(Some("  "), &address), "@1212...1");
    }
}
