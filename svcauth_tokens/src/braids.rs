use aliri_braid::braid;
use std::fmt;

/// Implements redacting `Debug` and `Display` for a borrowed secret type
///
/// Plain formatting prints only a placeholder naming the kind of secret. The
/// alternate form (`{:#?}`, `{:#}`) shows a prefix of the value, as long as the
/// formatter width or `$debug_len` for `Debug`, and the whole value for
/// `Display` unless a width is given.
macro_rules! redacted {
    ($ty:ty: $label:literal, $debug_len:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if !f.alternate() {
                    return f.write_str(concat!("***", $label, "***"));
                }
                f.write_str("\"")?;
                reveal_prefix(&self.0, f, $debug_len)?;
                f.write_str("\"")
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if !f.alternate() {
                    return f.write_str(concat!("***", $label, "***"));
                }
                reveal_prefix(&self.0, f, usize::MAX)
            }
        }
    };
}

/// Writes the value cut to the formatter width (or `default_len`) characters,
/// the last of which becomes `…` when anything is cut
fn reveal_prefix(secret: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let width = f.width().unwrap_or(default_len);
    if width <= 1 {
        return f.write_str("…");
    }
    if width > secret.len() {
        return f.write_str(secret);
    }

    match secret.char_indices().nth(width - 2) {
        Some((idx, c)) if idx + c.len_utf8() < secret.len() => {
            let end = idx + c.len_utf8();
            write!(f, "{}…", &secret[..end])
        }
        _ => f.write_str(secret),
    }
}

/// A client ID
#[braid(serde)]
pub struct ClientId;

/// A client secret
#[braid(serde, debug = "owned", display = "owned")]
pub struct ClientSecret;

redacted!(ClientSecretRef: "CLIENT SECRET", 5);

/// An access token issued by the authority
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

redacted!(AccessTokenRef: "ACCESS TOKEN", 15);
