//! Token encoding and decoding
//!
//! `token = compress(header + swap(canonical(doc)))`, compressed with
//! `lz-str`'s URI-component variant so the token can be pasted into a URL
//! query value as is.

use tracing::debug;

use super::canonical::{from_canonical, to_canonical};
use super::header::Header;
use super::swap::MappingRegistry;
use super::{CodecError, FORMAT_VERSION, MIN_SUPPORTED_VERSION};
use crate::domain::ProjectDocument;

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '$')
}

/// Encodes a document into a URL-safe token
pub fn encode(doc: &ProjectDocument, registry: &MappingRegistry) -> Result<String, CodecError> {
    let canonical = to_canonical(doc)?;
    let group = registry.select(&canonical);
    let header = Header {
        version: FORMAT_VERSION,
        group: group.id(),
    };

    let mut payload = header.render();
    payload.push_str(&group.swap(&canonical));

    let token = lz_str::compress_to_encoded_uri_component(payload.as_str());
    debug!(
        project = %doc.id,
        group = group.id(),
        canonical_len = canonical.len(),
        token_len = token.len(),
        "encoded project token"
    );
    Ok(token)
}

/// Decodes a token produced by [`encode`]
pub fn decode(token: &str, registry: &MappingRegistry) -> Result<ProjectDocument, CodecError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(CodecError::EmptyToken);
    }
    if let Some(bad) = token.chars().find(|&c| !is_token_char(c)) {
        return Err(CodecError::InvalidCharacter(bad));
    }

    let units =
        lz_str::decompress_from_encoded_uri_component(token).ok_or(CodecError::Decompression)?;
    let text = String::from_utf16(&units).map_err(|_| CodecError::Decompression)?;

    let (header, payload) = Header::split(&text)?;
    if !(MIN_SUPPORTED_VERSION..=FORMAT_VERSION).contains(&header.version) {
        return Err(CodecError::UnknownVersion(header.version));
    }
    let group = registry
        .get(header.group)
        .ok_or(CodecError::UnknownGroup(header.group))?;

    debug!(version = header.version, group = header.group, "decoding project token");
    from_canonical(&group.swap(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::header::DELIMITER;
    use crate::domain::{Deadline, SharingRecord, Task, TaskStatus};
    use chrono::{NaiveDate, TimeZone, Utc};
    use proptest::prelude::*;

    fn registry() -> &'static MappingRegistry {
        MappingRegistry::builtin()
    }

    fn sample_document() -> ProjectDocument {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut doc = ProjectDocument::new("b".parse().unwrap(), "Move house");
        doc.start_date = NaiveDate::from_ymd_opt(2024, 6, 1);

        let mut fields = serde_json::Map::new();
        fields.insert("owner".into(), serde_json::json!("u-17"));
        doc.sharing = Some(SharingRecord::new(fields));

        let root = Task::new("0".parse().unwrap(), "荷造り", now)
            .with_status(TaskStatus::InProgress)
            .with_order(1);
        let mut child = Task::new("1".parse().unwrap(), "Book van", now)
            .with_parent("0".parse().unwrap())
            .with_status(TaskStatus::InProgress)
            .with_order(1);
        child.deadline = Some(Deadline::DayOffset(4));
        let mut other = Task::new("2".parse().unwrap(), "かばんを買う", now)
            .with_parent("0".parse().unwrap())
            .with_order(2);
        other.deadline = Some(Deadline::At(now));
        let mut gone = Task::new("3".parse().unwrap(), "Old", now);
        gone.is_deleted = true;

        doc.tasks = vec![root, child, other, gone];
        doc.last_synced = Some(now);
        doc
    }

    fn token_for_text(text: &str) -> String {
        lz_str::compress_to_encoded_uri_component(text)
    }

    #[test]
    fn full_document_roundtrips() {
        let doc = sample_document();
        let token = encode(&doc, registry()).unwrap();
        assert_eq!(decode(&token, registry()).unwrap(), doc);
    }

    #[test]
    fn empty_document_roundtrips() {
        let doc = ProjectDocument::new("a".parse().unwrap(), "");
        let token = encode(&doc, registry()).unwrap();
        assert_eq!(decode(&token, registry()).unwrap(), doc);
    }

    #[test]
    fn token_is_url_safe() {
        let token = encode(&sample_document(), registry()).unwrap();
        assert!(!token.is_empty());
        assert!(token.chars().all(is_token_char));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let doc = sample_document();
        let token = format!("  {}\n", encode(&doc, registry()).unwrap());
        assert_eq!(decode(&token, registry()).unwrap(), doc);
    }

    #[test]
    fn empty_and_foreign_tokens_rejected() {
        assert_eq!(decode("", registry()), Err(CodecError::EmptyToken));
        assert_eq!(decode("   ", registry()), Err(CodecError::EmptyToken));
        assert_eq!(
            decode("abc def", registry()),
            Err(CodecError::InvalidCharacter(' '))
        );
        assert_eq!(
            decode("abc=", registry()),
            Err(CodecError::InvalidCharacter('='))
        );
    }

    #[test]
    fn unknown_version_rejected() {
        let text = format!("9{d}0{d}{{}}", d = DELIMITER);
        assert_eq!(
            decode(&token_for_text(&text), registry()),
            Err(CodecError::UnknownVersion(9))
        );
    }

    #[test]
    fn unknown_group_rejected() {
        let text = format!("2{d}z{d}{{}}", d = DELIMITER);
        assert_eq!(
            decode(&token_for_text(&text), registry()),
            Err(CodecError::UnknownGroup(35))
        );
    }

    #[test]
    fn missing_header_rejected() {
        let token = token_for_text(r#"{"id":"a","projectName":"x"}"#);
        assert_eq!(decode(&token, registry()), Err(CodecError::MissingHeader));
    }

    #[test]
    fn version_one_payload_accepted() {
        let text = format!(
            "1{d}0{d}{}",
            r#"{"id":"c","projectName":"Legacy","startDate":"2023-01-01","tasks":[{"id":"0","name":"A","status":2,"deadline":7,"order":1,"lastUpdated":"2023-01-02T00:00:00Z"}]}"#,
            d = DELIMITER
        );
        let doc = decode(&token_for_text(&text), registry()).unwrap();
        assert_eq!(doc.project_name, "Legacy");
        assert_eq!(doc.tasks[0].deadline, Some(Deadline::DayOffset(7)));
    }

    #[test]
    fn corrupt_payload_is_a_parse_error() {
        let text = format!("2{d}0{d}{{not json", d = DELIMITER);
        assert!(matches!(
            decode(&token_for_text(&text), registry()),
            Err(CodecError::Parse(_))
        ));
    }

    fn task_strategy() -> impl Strategy<Value = Vec<(String, u8, Option<i64>)>> {
        prop::collection::vec(
            ("[a-zA-Z0-9 かきくけこ会議資料é\"\\\\]{1,12}", 0u8..4, prop::option::of(-30i64..400)),
            0..12,
        )
    }

    fn instant_strategy() -> impl Strategy<Value = chrono::DateTime<Utc>> {
        (0i64..4_000_000_000, 0u32..1_000_000_000)
            .prop_map(|(secs, nanos)| Utc.timestamp_opt(secs, nanos).unwrap())
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        #[test]
        fn arbitrary_documents_roundtrip(
            name in "\\PC{0,20}",
            rows in task_strategy(),
            floats in prop::collection::vec(any::<u64>(), 0..6),
            instants in prop::collection::vec(instant_strategy(), 0..4),
        ) {
            let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            let mut doc = ProjectDocument::new("q".parse().unwrap(), name);

            let mut fields = serde_json::Map::new();
            for (i, bits) in floats.into_iter().enumerate() {
                // NaN and infinities have no JSON form
                if let Some(n) = serde_json::Number::from_f64(f64::from_bits(bits)) {
                    fields.insert(format!("f{}", i), serde_json::Value::Number(n));
                }
            }
            if !fields.is_empty() {
                doc.sharing = Some(SharingRecord::new(fields));
            }

            for (i, (task_name, code, offset)) in rows.into_iter().enumerate() {
                let mut task = Task::new(i.to_string().parse().unwrap(), task_name, now)
                    .with_status(TaskStatus::try_from(code).unwrap())
                    .with_order(i as i64 + 1);
                task.deadline = match instants.get(i) {
                    Some(at) => Some(Deadline::At(*at)),
                    None => offset.map(Deadline::DayOffset),
                };
                doc.tasks.push(task);
            }

            let token = encode(&doc, registry()).unwrap();
            prop_assert!(token.chars().all(is_token_char));
            prop_assert_eq!(decode(&token, registry()).unwrap(), doc);
        }
    }
}
