//! Notation payload extraction.
//!
//! Plain MusicXML passes through untouched. An `.mxl` file is a zip archive that
//! usually carries:
//!   - `META-INF/container.xml`, the container manifest
//!   - the score itself, as `<name>.musicxml` or `<name>.xml`
//!   - optional extras (images, sounds)
//!
//! The score entry is chosen by extension in archive listing order: the first
//! `.musicxml` entry wins, and only when there is none does the first `.xml`
//! entry qualify. The manifest directory never qualifies.
//!
//! Declared entry sizes are untrusted: they only size the initial buffer up to
//! a cap, and reads stop at [`MAX_MARKUP_BYTES`].

use std::io::{Cursor, Read};

use bytes::Bytes;
use thiserror::Error;
use zip::{ZipArchive, result::ZipError};

use crate::domain::score::{NotationPayload, SourceDocument, SourceFormat};

const PREFERRED_SUFFIX: &[u8] = b".musicxml";
const FALLBACK_SUFFIX: &[u8] = b".xml";
const MANIFEST_DIR: &[u8] = b"META-INF/";
pub const MAX_MARKUP_BYTES: u64 = 64 * 1024 * 1024;
const MAX_CAPACITY_HINT: u64 = 4 * 1024 * 1024;
const MAX_EXPANSION_RATIO: u64 = 32;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no notation payload among {entries} archive entries")]
    NoNotationPayload { entries: usize },
    #[error("failed to open MXL archive: {0}")]
    Archive(#[source] ZipError),
    #[error("failed to read archive entry `{name}`: {message}")]
    Entry { name: String, message: String },
    #[error("archive entry `{name}` exceeds {limit} bytes")]
    TooLarge { name: String, limit: u64 },
}

/// Produce the notation payload for a fetched document.
pub fn extract(document: &SourceDocument) -> Result<NotationPayload, ExtractionError> {
    let markup = extract_markup(&document.bytes, document.format)?;
    Ok(NotationPayload {
        markup,
        title: document.title(),
    })
}

/// Return the plain markup carried by `bytes`.
pub fn extract_markup(bytes: &Bytes, format: SourceFormat) -> Result<Bytes, ExtractionError> {
    match format {
        SourceFormat::Plain => Ok(bytes.clone()),
        SourceFormat::Container => extract_from_container(bytes),
    }
}

fn extract_from_container(data: &[u8]) -> Result<Bytes, ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(data)).map_err(ExtractionError::Archive)?;

    // Listing only; side entries are never opened. Positions stay aligned with indices.
    let names: Vec<String> = (0..archive.len())
        .map(|index| archive.name_for_index(index).unwrap_or_default().to_string())
        .collect();

    let position = select_entry(&names).ok_or(ExtractionError::NoNotationPayload {
        entries: names.len(),
    })?;
    let name = &names[position];

    let entry = archive
        .by_index(position)
        .map_err(|err| ExtractionError::Entry {
            name: name.clone(),
            message: err.to_string(),
        })?;
    let hint = capacity_hint(entry.size(), data.len());
    let markup = read_entry(entry, name, hint, MAX_MARKUP_BYTES)?;

    Ok(Bytes::from(markup))
}

fn read_entry(
    reader: impl Read,
    name: &str,
    hint: usize,
    limit: u64,
) -> Result<Vec<u8>, ExtractionError> {
    let mut markup = Vec::with_capacity(hint);
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut markup)
        .map_err(|err| ExtractionError::Entry {
            name: name.to_string(),
            message: err.to_string(),
        })?;

    if markup.len() as u64 > limit {
        return Err(ExtractionError::TooLarge {
            name: name.to_string(),
            limit,
        });
    }
    Ok(markup)
}

/// Initial buffer size for an entry. The declared size comes from the archive
/// header and is only trusted up to a small multiple of the archive itself.
fn capacity_hint(declared: u64, archive_len: usize) -> usize {
    let plausible = (archive_len as u64).saturating_mul(MAX_EXPANSION_RATIO);
    let hint = declared.min(plausible).min(MAX_CAPACITY_HINT);
    usize::try_from(hint).unwrap_or(0)
}

/// Index of the entry holding the score, in listing order.
fn select_entry(names: &[String]) -> Option<usize> {
    let first_with = |suffix: &[u8]| {
        names
            .iter()
            .position(|name| is_candidate(name) && has_suffix(name, suffix))
    };
    first_with(PREFERRED_SUFFIX).or_else(|| first_with(FALLBACK_SUFFIX))
}

fn is_candidate(name: &str) -> bool {
    let bytes = name.as_bytes();
    let in_manifest = bytes.len() >= MANIFEST_DIR.len()
        && bytes[..MANIFEST_DIR.len()].eq_ignore_ascii_case(MANIFEST_DIR);
    !name.ends_with('/') && !in_manifest
}

fn has_suffix(name: &str, suffix: &[u8]) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= suffix.len() && bytes[bytes.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

    use super::*;

    fn archive(entries: &[(&str, &str)]) -> Bytes {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .expect("add directory");
                continue;
            }
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(contents.as_bytes()).expect("write entry");
        }
        Bytes::from(writer.finish().expect("finish archive").into_inner())
    }

    fn extract_container(data: Bytes) -> Result<Bytes, ExtractionError> {
        extract_markup(&data, SourceFormat::Container)
    }

    #[test]
    fn plain_markup_passes_through_unchanged() {
        let inputs: [&[u8]; 3] = [b"<score-partwise/>", b"", &[0xff, 0x00, 0x7f, b'<']];
        for input in inputs {
            let data = Bytes::copy_from_slice(input);
            let markup = extract_markup(&data, SourceFormat::Plain).expect("plain passthrough");
            assert_eq!(markup, data);
        }
    }

    #[test]
    fn preferred_extension_wins_over_listing_position() {
        let data = archive(&[("a.xml", "fallback"), ("b.musicxml", "preferred")]);
        assert_eq!(extract_container(data).expect("payload"), "preferred");
    }

    #[test]
    fn first_preferred_entry_wins() {
        let data = archive(&[
            ("first.musicxml", "first"),
            ("second.musicxml", "second"),
            ("extra.xml", "fallback"),
        ]);
        assert_eq!(extract_container(data).expect("payload"), "first");
    }

    #[test]
    fn fallback_takes_first_xml_entry_in_listing_order() {
        let data = archive(&[
            ("cover.png", "png"),
            ("score.XML", "score"),
            ("parts.xml", "parts"),
        ]);
        assert_eq!(extract_container(data).expect("payload"), "score");
    }

    #[test]
    fn manifest_and_directories_are_never_selected() {
        let data = archive(&[
            ("META-INF/", ""),
            ("META-INF/container.xml", "<container/>"),
            ("scores.xml/", ""),
            ("scores.xml/score.xml", "score"),
        ]);
        assert_eq!(extract_container(data).expect("payload"), "score");
    }

    #[test]
    fn archive_without_notation_entry_is_rejected() {
        let data = archive(&[("META-INF/container.xml", "<container/>"), ("cover.png", "png")]);
        let err = extract_container(data).expect_err("no payload");
        assert!(
            matches!(err, ExtractionError::NoNotationPayload { entries: 2 }),
            "unexpected error: {err:?}"
        );
        assert!(err.to_string().contains("no notation payload"));
    }

    #[test]
    fn non_archive_bytes_are_rejected() {
        let err = extract_container(Bytes::from_static(b"<score-partwise/>")).expect_err("not zip");
        assert!(matches!(err, ExtractionError::Archive(_)), "unexpected error: {err:?}");
    }

    /// Overwrite a field of the first entry in both its local and central
    /// headers. Offsets are relative to each header's signature.
    fn patch_first_entry(data: &mut [u8], local_field: usize, central_field: usize, value: &[u8]) {
        const LOCAL: &[u8] = b"PK\x03\x04";
        const CENTRAL: &[u8] = b"PK\x01\x02";
        for (signature, field) in [(LOCAL, local_field), (CENTRAL, central_field)] {
            let header = data
                .windows(signature.len())
                .position(|window| window == signature)
                .expect("header present");
            let at = header + field;
            data[at..at + value.len()].copy_from_slice(value);
        }
    }

    #[test]
    fn forged_declared_size_does_not_size_the_buffer() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(
                "score.musicxml",
                SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
            )
            .expect("start entry");
        writer.write_all(b"<score-partwise/>").expect("write entry");
        let mut data = writer.finish().expect("finish archive").into_inner();
        // Uncompressed size.
        patch_first_entry(&mut data, 22, 24, &0xFFFF_FFFE_u32.to_le_bytes());

        match extract_container(Bytes::from(data)) {
            Ok(markup) => assert_eq!(markup, "<score-partwise/>"),
            Err(err) => assert!(
                matches!(err, ExtractionError::Entry { .. } | ExtractionError::Archive(_)),
                "unexpected error: {err:?}"
            ),
        }
    }

    #[test]
    fn capacity_hint_is_bounded_by_archive_and_cap() {
        assert_eq!(capacity_hint(17, 200), 17);
        assert_eq!(capacity_hint(0xFFFF_FFFE, 200), 200 * 32);
        assert_eq!(
            capacity_hint(u64::MAX, usize::MAX),
            MAX_CAPACITY_HINT as usize
        );
    }

    #[test]
    fn oversized_entry_is_rejected() {
        let err = read_entry(Cursor::new(vec![b'a'; 10]), "big.musicxml", 0, 4)
            .expect_err("over limit");
        assert!(
            matches!(err, ExtractionError::TooLarge { limit: 4, .. }),
            "unexpected error: {err:?}"
        );

        let exact = read_entry(Cursor::new(vec![b'a'; 4]), "fits.musicxml", 64, 4).expect("fits");
        assert_eq!(exact.len(), 4);
    }

    #[test]
    fn unreadable_side_entries_are_not_opened() {
        let mut data = archive(&[
            ("cover.png", "png"),
            ("score.musicxml", "<score-partwise/>"),
        ])
        .to_vec();
        // Compression method 14 (LZMA) is not compiled in.
        patch_first_entry(&mut data, 8, 10, &14_u16.to_le_bytes());

        let payload = extract_container(Bytes::from(data)).expect("payload");
        assert_eq!(payload, "<score-partwise/>");
    }

    #[test]
    fn extract_carries_title_from_key() {
        let document = SourceDocument::new(
            "library/etudes/op10.mxl",
            archive(&[("op10.musicxml", "<score-partwise/>")]),
        );
        let payload = extract(&document).expect("payload");
        assert_eq!(payload.title, "op10.mxl");
        assert_eq!(payload.markup, "<score-partwise/>");
    }
}
