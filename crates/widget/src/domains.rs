//! Allowed-domain normalization

use url::Url;

const QUOTES: &[char] = &['"', '\''];

/// Normalize one allowed-domain entry to a bare hostname.
///
/// Quotes, scheme, path, a leading `www.` and trailing dots are removed and
/// the result is lowercased. Anything without a dot (other than
/// `localhost`) is rejected as an empty string.
pub fn normalize_domain_entry(line: &str) -> String {
    let mut s = line.trim();
    if s.is_empty() {
        return String::new();
    }

    s = s.strip_prefix(QUOTES).unwrap_or(s);
    s = s.strip_suffix(QUOTES).unwrap_or(s);

    let mut host = s.to_string();
    if s.starts_with("http://") || s.starts_with("https://") {
        if let Some(h) = Url::parse(s).ok().and_then(|u| u.host_str().map(str::to_string)) {
            host = h;
        }
    }

    let host = host.split('/').next().unwrap_or_default().trim().to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let host = host.trim_end_matches('.');

    if host != "localhost" && !host.contains('.') {
        return String::new();
    }
    host.to_string()
}

/// Normalize a multi-line block of domains, dropping rejects and duplicates.
///
/// First-seen order is kept.
pub fn parse_allowed_domains(text: &str) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for entry in text.lines().map(normalize_domain_entry) {
        if !entry.is_empty() && !domains.contains(&entry) {
            domains.push(entry);
        }
    }
    domains
}
