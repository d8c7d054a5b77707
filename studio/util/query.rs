/// Decodes a percent-encoded string (`%XX`) and converts `+` to space.
/// Malformed escapes are kept literally.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 3 <= bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parses `key=value&key2=value2` into `(key, value)` pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut it = pair.splitn(2, '=');
            let k = it.next().unwrap_or("");
            let v = it.next().unwrap_or("");
            (url_decode(k), url_decode(v))
        })
        .collect()
}

pub fn query_get<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

/// `user_id` from the query string, if present and numeric.
pub fn user_id(pairs: &[(String, String)]) -> Option<i64> {
    query_get(pairs, "user_id").and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_escapes_and_plus() {
        assert_eq!(url_decode("a+b%2Fc%"), "a b/c%");
        assert_eq!(url_decode("%C3%A9"), "é");
        assert_eq!(url_decode("%zz"), "%zz");
    }

    #[test]
    fn parses_pairs() {
        let pairs = parse_query("user_id=7&name=my+model&flag");
        assert_eq!(user_id(&pairs), Some(7));
        assert_eq!(query_get(&pairs, "name"), Some("my model"));
        assert_eq!(query_get(&pairs, "flag"), Some(""));
        assert_eq!(query_get(&pairs, "missing"), None);
    }
}
