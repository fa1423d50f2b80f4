//! Project archive format (zip container, msgpack payloads).
//!
//! | Entry                      | Payload                                   |
//! |----------------------------|-------------------------------------------|
//! | `meta.msgpack`             | `{ version }`                             |
//! | `stage.msgpack`            | array of stage objects, `_` = kind        |
//! | `tags.msgpack`             | array of tagged stage-object ids          |
//! | `references.msgpack`       | `{ sections, files }` back-references     |
//! | `attachments/<uuid>.<ext>` | raw attachment bytes                      |
//!
//! Archives without `meta.msgpack` predate explicit versioning and are read
//! as `LEGACY_VERSION`.

use crate::attachment::{ATTACHMENT_DIR, Attachment, entry_name, mime_for_extension, parse_entry_name};
use crate::error::ArchiveError;
use crate::id::{AttachmentId, StageId};
use crate::model::StageObject;
use crate::references::References;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Current document format version.
pub const DOCUMENT_VERSION: u32 = 18;
/// Version assumed for archives without a `meta.msgpack` entry.
pub const LEGACY_VERSION: u32 = 17;

pub const META_ENTRY: &str = "meta.msgpack";
pub const STAGE_ENTRY: &str = "stage.msgpack";
pub const TAGS_ENTRY: &str = "tags.msgpack";
pub const REFERENCES_ENTRY: &str = "references.msgpack";

#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    version: u32,
}

/// Decoded archive contents.
#[derive(Debug, Clone, PartialEq)]
pub struct Archive {
    pub version: u32,
    pub stage: Vec<StageObject>,
    pub tags: Vec<StageId>,
    pub attachments: BTreeMap<AttachmentId, Attachment>,
    pub references: References,
}

/// Borrowed view of a project, for writing.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveRef<'a> {
    pub stage: &'a [StageObject],
    pub tags: &'a [StageId],
    pub attachments: &'a BTreeMap<AttachmentId, Attachment>,
    pub references: &'a References,
}

// ─── Stage payload ───────────────────────────────────────────────────────

pub fn encode_stage(objects: &[StageObject]) -> Result<Vec<u8>, ArchiveError> {
    Ok(rmp_serde::to_vec_named(objects)?)
}

/// Decode a stage array. Objects with an unknown kind or malformed fields
/// are skipped with a warning; the rest of the stage still loads.
pub fn decode_stage(bytes: &[u8]) -> Result<Vec<StageObject>, ArchiveError> {
    let raw: Vec<serde_json::Value> = rmp_serde::from_slice(bytes)?;
    let mut objects = Vec::with_capacity(raw.len());
    for (i, value) in raw.into_iter().enumerate() {
        let kind = value
            .get("_")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("<untagged>")
            .to_string();
        match serde_json::from_value::<StageObject>(value) {
            Ok(obj) => objects.push(obj),
            Err(e) => log::warn!("skipping stage object #{i} ({kind}): {e}"),
        }
    }
    Ok(objects)
}

fn decode_tags(bytes: &[u8]) -> Result<Vec<StageId>, ArchiveError> {
    let raw: Vec<String> = rmp_serde::from_slice(bytes)?;
    Ok(raw
        .iter()
        .filter_map(|s| {
            let id = StageId::parse(s);
            if id.is_none() {
                log::warn!("skipping malformed tag `{s}`");
            }
            id
        })
        .collect())
}

/// Bring objects written by older versions up to date.
fn migrate(version: u32, stage: &mut [StageObject]) {
    if version >= DOCUMENT_VERSION {
        return;
    }
    log::info!("migrating stage from v{version} to v{DOCUMENT_VERSION}");
    for obj in stage.iter_mut() {
        if let StageObject::LineEdge(edge) = obj {
            edge.migrate_legacy_sides();
        }
    }
}

// ─── Zip container ───────────────────────────────────────────────────────

pub fn write_archive(project: ArchiveRef<'_>) -> Result<Vec<u8>, ArchiveError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(META_ENTRY, options)?;
    zip.write_all(&rmp_serde::to_vec_named(&Meta {
        version: DOCUMENT_VERSION,
    })?)?;

    zip.start_file(STAGE_ENTRY, options)?;
    zip.write_all(&encode_stage(project.stage)?)?;

    zip.start_file(TAGS_ENTRY, options)?;
    zip.write_all(&rmp_serde::to_vec(project.tags)?)?;

    zip.start_file(REFERENCES_ENTRY, options)?;
    zip.write_all(&rmp_serde::to_vec_named(project.references)?)?;

    for (id, attachment) in project.attachments {
        zip.start_file(entry_name(*id, &attachment.mime), options)?;
        zip.write_all(&attachment.data)?;
    }

    let bytes = zip.finish()?.into_inner();
    log::debug!(
        "wrote archive: {} objects, {} tags, {} attachments, {} bytes",
        project.stage.len(),
        project.tags.len(),
        project.attachments.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Strict read. `Project::from_archive_bytes` wraps this with the fail-soft
/// fallback.
pub fn read_archive(bytes: &[u8]) -> Result<Archive, ArchiveError> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))?;
    let mut version = LEGACY_VERSION;
    let mut stage_bytes: Option<Vec<u8>> = None;
    let mut tags = Vec::new();
    let mut references = References::default();
    let mut attachments = BTreeMap::new();

    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;

        match name.as_str() {
            META_ENTRY => version = rmp_serde::from_slice::<Meta>(&buf)?.version,
            STAGE_ENTRY => stage_bytes = Some(buf),
            TAGS_ENTRY => tags = decode_tags(&buf)?,
            REFERENCES_ENTRY => references = rmp_serde::from_slice(&buf)?,
            _ => match parse_entry_name(&name) {
                Some((raw_id, ext)) => match AttachmentId::parse(raw_id) {
                    Some(id) => {
                        attachments.insert(id, Attachment::new(mime_for_extension(ext), buf));
                    }
                    None => log::warn!("skipping attachment with non-uuid name `{name}`"),
                },
                None if name.starts_with(ATTACHMENT_DIR) => {
                    log::warn!("skipping attachment entry with unexpected name `{name}`")
                }
                None => log::warn!("skipping unknown archive entry `{name}`"),
            },
        }
    }

    if version > DOCUMENT_VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    let stage_bytes = stage_bytes.ok_or(ArchiveError::MissingEntry(STAGE_ENTRY))?;
    let mut stage = decode_stage(&stage_bytes)?;
    migrate(version, &mut stage);

    log::info!(
        "loaded archive v{version}: {} objects, {} tags, {} attachments",
        stage.len(),
        tags.len(),
        attachments.len()
    );
    Ok(Archive {
        version,
        stage,
        tags,
        attachments,
        references,
    })
}

// ─── Files ───────────────────────────────────────────────────────────────

/// Write `bytes` next to `path` and rename over it, so a failed save never
/// leaves a truncated document behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);
    {
        let file = File::create(tmp)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    std::fs::rename(tmp, path)?;
    Ok(())
}

pub fn read_file(path: &Path) -> Result<Archive, ArchiveError> {
    let bytes = std::fs::read(path)?;
    read_archive(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{LineEdge, RATE_CENTER, RATE_LEFT, RATE_RIGHT};
    use crate::entity::TextNode;
    use crate::geometry::Point;
    use pretty_assertions::assert_eq;

    fn zip_of(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn missing_stage_entry_is_an_error() {
        let bytes = zip_of(&[(TAGS_ENTRY, rmp_serde::to_vec(&Vec::<String>::new()).unwrap())]);
        assert!(matches!(
            read_archive(&bytes),
            Err(ArchiveError::MissingEntry(STAGE_ENTRY))
        ));
    }

    #[test]
    fn garbage_is_a_zip_error() {
        assert!(matches!(read_archive(b"definitely not a zip"), Err(ArchiveError::Zip(_))));
    }

    #[test]
    fn newer_version_rejected() {
        let bytes = zip_of(&[
            (META_ENTRY, rmp_serde::to_vec_named(&Meta { version: 99 }).unwrap()),
            (STAGE_ENTRY, encode_stage(&[]).unwrap()),
        ]);
        assert!(matches!(
            read_archive(&bytes),
            Err(ArchiveError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn unknown_object_kind_is_skipped() {
        #[derive(Serialize)]
        struct Alien {
            #[serde(rename = "_")]
            kind: &'static str,
            uuid: String,
        }
        let node = StageObject::from(TextNode::new("kept", Point::ZERO));
        let mut raw: Vec<serde_json::Value> = vec![serde_json::to_value(&node).unwrap()];
        raw.push(
            serde_json::to_value(Alien {
                kind: "HologramNode",
                uuid: StageId::new().to_string(),
            })
            .unwrap(),
        );
        let bytes = rmp_serde::to_vec_named(&raw).unwrap();
        let decoded = decode_stage(&bytes).unwrap();
        assert_eq!(decoded, vec![node]);
    }

    #[test]
    fn legacy_edges_get_rates_from_sides() {
        let a = StageId::new();
        let b = StageId::new();
        let mut raw = serde_json::to_value(StageObject::from(LineEdge::connect(a, b))).unwrap();
        raw["sourceSide"] = "right".into();
        raw["targetSide"] = "left".into();
        let stage = rmp_serde::to_vec_named(&vec![raw]).unwrap();
        let bytes = zip_of(&[(STAGE_ENTRY, stage)]);

        let archive = read_archive(&bytes).unwrap();
        assert_eq!(archive.version, LEGACY_VERSION);
        let edge = archive.stage[0].as_edge().unwrap();
        assert_eq!(edge.source_rectangle_rate, RATE_RIGHT);
        assert_eq!(edge.target_rectangle_rate, RATE_LEFT);
        assert!(edge.is_left_to_right());
    }

    #[test]
    fn current_version_ignores_sides() {
        let a = StageId::new();
        let b = StageId::new();
        let mut raw = serde_json::to_value(StageObject::from(LineEdge::connect(a, b))).unwrap();
        raw["sourceSide"] = "right".into();
        let bytes = zip_of(&[
            (META_ENTRY, rmp_serde::to_vec_named(&Meta { version: DOCUMENT_VERSION }).unwrap()),
            (STAGE_ENTRY, rmp_serde::to_vec_named(&vec![raw]).unwrap()),
        ]);
        let archive = read_archive(&bytes).unwrap();
        assert_eq!(archive.stage[0].as_edge().unwrap().source_rectangle_rate, RATE_CENTER);
    }

    #[test]
    fn foreign_entries_are_skipped() {
        let id = AttachmentId::new();
        let good = format!("attachments/{id}.png");
        let bytes = zip_of(&[
            (STAGE_ENTRY, encode_stage(&[]).unwrap()),
            (good.as_str(), vec![1, 2, 3]),
            ("attachments/not_valid!.png", vec![4]),
            ("attachments/deadbeef.png", vec![5]),
            ("thumbnail.png", vec![6]),
        ]);
        let archive = read_archive(&bytes).unwrap();
        assert_eq!(archive.attachments.len(), 1);
        assert_eq!(archive.attachments[&id], Attachment::new("image/png", vec![1, 2, 3]));
    }
}
