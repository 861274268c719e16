use md5::{Digest, Md5};

#[must_use]
pub fn md5_hex(input: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Salted, stable replacement for an integer row id.
///
/// `None` and `0` both mean "no id" and hash to `None`. An empty salt is the
/// same as no salt: the digest input is then the bare decimal value.
#[must_use]
pub fn hash_id(salt: Option<&str>, value: Option<i64>) -> Option<String> {
    let value = value.filter(|value| *value != 0)?;
    let input = match salt.filter(|salt| !salt.is_empty()) {
        Some(salt) => format!("{salt}-{value}"),
        None => value.to_string(),
    };
    Some(md5_hex(&input))
}
