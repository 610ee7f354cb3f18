/// Redaction helpers for log output
///
/// Wallet addresses, identifiers and signatures are shortened so that logs
/// stay useful for debugging without becoming a correlation source.
/// Secrets are never printed.

// ============================================================================
// Identifier Sanitization
// ============================================================================

/// Shorten an identifier to "abc12345...90ef" (first 8 + last 4 chars)
pub fn sanitize_id(id: &str) -> String {
    if id.len() < 12 || !id.is_char_boundary(8) || !id.is_char_boundary(id.len() - 4) {
        return "[short_id]".to_string();
    }
    format!("{}...{}", &id[..8], &id[id.len() - 4..])
}

/// Shorten a Solana wallet address to "7xKX...gAsU" (first 4 + last 4 chars)
pub fn sanitize_wallet(address: &str) -> String {
    if address.len() < 10 || !address.is_ascii() {
        return "<invalid-wallet>".to_string();
    }
    format!("{}...{}", &address[..4], &address[address.len() - 4..])
}

// ============================================================================
// Secret Sanitization
// ============================================================================

/// Webhook secrets and encryption keys: length only
pub fn sanitize_secret(secret: &str) -> String {
    format!("[secret: {} bytes]", secret.len())
}

/// Signatures and hashes: first 6 chars only
pub fn sanitize_signature(sig: &str) -> String {
    match sig.get(..6) {
        Some(prefix) if sig.len() > 6 => format!("{prefix}..."),
        _ => "[signature]".to_string(),
    }
}

/// Endpoints may carry credentials in the query string; keep scheme and host
pub fn sanitize_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => format!("{}://{}", parsed.scheme(), host),
            None => format!("{}://[no-host]", parsed.scheme()),
        },
        Err(_) => "[invalid_url]".to_string(),
    }
}
