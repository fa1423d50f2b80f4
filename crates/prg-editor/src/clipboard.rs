//! Copy/paste between documents and the OS.
//!
//! Two clipboards are involved:
//!
//! - the **virtual clipboard**, in-process, carrying the encoded stage
//!   subgraph plus the attachment payloads it references;
//! - the **system clipboard**, behind the `SystemClipboard` trait, which
//!   only sees plain text or a single image.
//!
//! Paste prefers the virtual clipboard. Every pasted object gets a fresh
//! uuid in a first pass; references are rewritten in a second pass, so an
//! association may list a member that appears later in the payload.

use prg_core::archive::{self, decode_stage};
use prg_core::geometry::bounding_rect;
use prg_core::{
    ArchiveError, Attachment, AttachmentId, Entity, ImageNode, Point, Project, Size, StageError,
    StageId, StageObject, SvgNode, TextNode, Vec2,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use winnow::ascii::multispace0;
use winnow::combinator::{alt, delimited, preceded, repeat, separated_pair};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

/// Plain text longer than this goes into the node details instead of the
/// title.
pub const LONG_TEXT_LIMIT: usize = 3000;

pub const LONG_TEXT_TITLE: &str = "Pasted text too long (over 3000 characters), moved to details";

/// Used when an SVG declares no usable width/height.
pub const DEFAULT_SVG_SIZE: Size = Size::new(100.0, 100.0);

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("system clipboard is unavailable")]
    Unavailable,

    #[error("clipboard access was denied")]
    Denied,

    #[error("clipboard is empty")]
    Empty,

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// An image as exchanged with the OS clipboard.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardImage {
    pub mime: String,
    pub data: Vec<u8>,
    /// Pixel size, as reported by the host.
    pub size: Size,
}

/// Host clipboard access.
pub trait SystemClipboard {
    fn read_text(&mut self) -> Result<String, ClipboardError>;

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError>;

    fn read_image(&mut self) -> Result<ClipboardImage, ClipboardError>;

    fn write_image(&mut self, image: &ClipboardImage) -> Result<(), ClipboardError>;
}

/// In-memory system clipboard for hosts without one, and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    pub text: Option<String>,
    pub image: Option<ClipboardImage>,
    /// Simulate a permission failure on every read.
    pub deny_reads: bool,
}

impl SystemClipboard for MemoryClipboard {
    fn read_text(&mut self) -> Result<String, ClipboardError> {
        if self.deny_reads {
            return Err(ClipboardError::Denied);
        }
        self.text.clone().ok_or(ClipboardError::Empty)
    }

    fn write_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.text = Some(text.to_string());
        self.image = None;
        Ok(())
    }

    fn read_image(&mut self) -> Result<ClipboardImage, ClipboardError> {
        if self.deny_reads {
            return Err(ClipboardError::Denied);
        }
        self.image.clone().ok_or(ClipboardError::Empty)
    }

    fn write_image(&mut self, image: &ClipboardImage) -> Result<(), ClipboardError> {
        self.image = Some(image.clone());
        self.text = None;
        Ok(())
    }
}

/// A copied subgraph.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualClipboard {
    /// `archive::encode_stage` of the copied objects, in paint order.
    stage: Vec<u8>,
    attachments: BTreeMap<AttachmentId, Attachment>,
}

impl VirtualClipboard {
    pub fn objects(&self) -> Result<Vec<StageObject>, ClipboardError> {
        Ok(decode_stage(&self.stage)?)
    }

    pub fn attachments(&self) -> &BTreeMap<AttachmentId, Attachment> {
        &self.attachments
    }
}

#[derive(Debug, Default)]
pub struct CopyEngine {
    virtual_clipboard: Option<VirtualClipboard>,
}

impl CopyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn virtual_clipboard(&self) -> Option<&VirtualClipboard> {
        self.virtual_clipboard.as_ref()
    }

    pub fn has_virtual_content(&self) -> bool {
        self.virtual_clipboard.is_some()
    }

    /// Copy the selection. Sections bring their contents along, and every
    /// association whose members were all copied comes too. An empty
    /// selection empties the virtual clipboard. The selection is cleared
    /// afterwards. Returns the number of copied objects.
    pub fn copy(
        &mut self,
        project: &mut Project,
        system: &mut dyn SystemClipboard,
    ) -> Result<usize, ClipboardError> {
        let selected = project.selected_ids();
        if selected.is_empty() {
            log::debug!("nothing selected, clearing virtual clipboard");
            self.virtual_clipboard = None;
            return Ok(0);
        }

        let objects = copy_set(project, &selected);
        let attachments: BTreeMap<AttachmentId, Attachment> = objects
            .iter()
            .filter_map(StageObject::attachment_id)
            .filter_map(|id| project.attachment(id).map(|a| (id, a.clone())))
            .collect();
        let stage = archive::encode_stage(&objects)?;
        log::info!(
            "copied {} objects ({} attachments)",
            objects.len(),
            attachments.len()
        );
        self.virtual_clipboard = Some(VirtualClipboard { stage, attachments });

        if let Err(e) = write_system(project, &objects, system) {
            log::warn!("could not write system clipboard: {e}");
        }
        project.clear_selection();
        Ok(objects.len())
    }

    /// Copy, then remove the selected objects. Selected sections take their
    /// copied contents with them instead of releasing them.
    pub fn cut(
        &mut self,
        project: &mut Project,
        system: &mut dyn SystemClipboard,
    ) -> Result<usize, ClipboardError> {
        let mut doomed = project.selected_ids();
        for id in doomed.clone() {
            if project.section(id).is_some() {
                doomed.extend(project.descendants(id));
            }
        }
        let copied = self.copy(project, system)?;
        project.remove_many(&doomed);
        Ok(copied)
    }

    /// Paste at `at` (world coordinates). Failures are logged and yield an
    /// empty result. Returns the ids of the pasted top-level objects, which
    /// become the new selection.
    pub fn paste(
        &mut self,
        project: &mut Project,
        system: &mut dyn SystemClipboard,
        at: Point,
    ) -> Vec<StageId> {
        let result = match self.virtual_clipboard.take() {
            Some(clip) => paste_virtual(project, &clip),
            None => paste_system(project, system, at),
        };
        match result {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("paste failed: {e}");
                Vec::new()
            }
        }
    }
}

/// Selected objects, section contents and the associations fully inside
/// that set, in paint order.
fn copy_set(project: &Project, selected: &[StageId]) -> Vec<StageObject> {
    let mut entities: BTreeSet<StageId> = BTreeSet::new();
    for id in selected {
        if project.entity(*id).is_none() {
            continue;
        }
        entities.insert(*id);
        if project.section(*id).is_some() {
            entities.extend(project.descendants(*id));
        }
    }
    project
        .stage()
        .iter()
        .filter(|obj| {
            if obj.is_entity() {
                entities.contains(&obj.uuid())
            } else {
                let members = obj.members();
                !members.is_empty() && members.iter().all(|m| entities.contains(&m.id))
            }
        })
        .cloned()
        .collect()
}

/// Text nodes as blank-line separated text, or a single image node as an
/// image.
fn write_system(
    project: &Project,
    objects: &[StageObject],
    system: &mut dyn SystemClipboard,
) -> Result<(), ClipboardError> {
    if let [StageObject::ImageNode(image)] = objects {
        let Some(blob) = project.attachment(image.attachment_id) else {
            log::warn!("image {} has no attachment", image.uuid);
            return Ok(());
        };
        return system.write_image(&ClipboardImage {
            mime: blob.mime.clone(),
            data: blob.data.clone(),
            size: image.size,
        });
    }
    let texts: Vec<&str> = objects
        .iter()
        .filter_map(|o| match o {
            StageObject::TextNode(n) => Some(n.text.as_str()),
            _ => None,
        })
        .collect();
    if texts.is_empty() {
        return Ok(());
    }
    system.write_text(&texts.join("\n\n"))
}

fn paste_virtual(project: &mut Project, clip: &VirtualClipboard) -> Result<Vec<StageId>, ClipboardError> {
    let objects = clip.objects()?;

    // Pass 1: fresh ids for everything in the payload.
    let remap: HashMap<StageId, StageId> = objects
        .iter()
        .map(|o| (o.uuid(), StageId::new()))
        .collect();

    // Pass 2: rewrite references and clone attachments.
    let mut cloned: HashMap<AttachmentId, AttachmentId> = HashMap::new();
    let mut pasted = Vec::with_capacity(objects.len());
    for mut obj in objects {
        let old = obj.uuid();
        if !obj.remap_references(|id| remap.get(&id).copied()) {
            log::warn!("dropping {} {old}: a member was not copied", obj.kind());
            continue;
        }
        if let Some(new) = remap.get(&old) {
            obj.set_uuid(*new);
        }
        if let Some(texture) = obj.as_texture_mut() {
            let source = texture.attachment_id();
            if let Some(target) = cloned.get(&source) {
                texture.set_attachment_id(*target);
            } else if let Some(blob) = clip.attachments.get(&source) {
                let target = project.add_attachment(&blob.mime, blob.data.clone());
                cloned.insert(source, target);
                texture.set_attachment_id(target);
            } else {
                log::warn!("attachment {source} missing from clipboard, keeping reference");
            }
        }
        pasted.push(obj);
    }

    project.clear_selection();
    let inserted = project.insert_objects(pasted);
    let inserted_set: BTreeSet<StageId> = inserted.iter().copied().collect();
    let roots: Vec<StageId> = inserted
        .iter()
        .copied()
        .filter(|id| project.entity(*id).is_some())
        .filter(|id| !project.ancestors(*id).iter().any(|a| inserted_set.contains(a)))
        .collect();

    // Drop the copy just below the originals.
    let height = bounding_rect(roots.iter().filter_map(|id| project.entity(*id).map(|e| e.rect())))
        .map(|r| r.height())
        .unwrap_or(0.0);
    for id in &roots {
        project.move_entity(*id, Vec2::new(0.0, height))?;
        project.set_selected(*id, true);
    }
    log::info!("pasted {} objects", inserted.len());
    Ok(roots)
}

fn paste_system(
    project: &mut Project,
    system: &mut dyn SystemClipboard,
    at: Point,
) -> Result<Vec<StageId>, ClipboardError> {
    match system.read_text() {
        Ok(text) if !text.trim().is_empty() => return paste_text(project, &text, at),
        Ok(_) => log::debug!("clipboard text is empty, trying image"),
        Err(e) => log::warn!("cannot read clipboard text, trying image: {e}"),
    }
    let image = system.read_image()?;
    let blob = project.add_attachment(&image.mime, image.data);
    let location = at - image.size.to_vec2() / 2.0;
    let id = project.add(ImageNode::new(blob, location, image.size))?;
    enter_section_under(project, id, at);
    Ok(vec![id])
}

fn paste_text(project: &mut Project, text: &str, at: Point) -> Result<Vec<StageId>, ClipboardError> {
    let id = if is_svg(text) {
        let size = svg_size(text).unwrap_or(DEFAULT_SVG_SIZE);
        let blob = project.add_attachment("image/svg+xml", text.as_bytes().to_vec());
        project.add(SvgNode::new(blob, at, size))?
    } else if text.chars().count() > LONG_TEXT_LIMIT {
        let mut node = TextNode::new(LONG_TEXT_TITLE, at);
        node.details = text_to_details(text);
        project.add(node)?
    } else {
        let id = project.add(TextNode::new(text, at))?;
        // Centre the node on the pointer.
        if let Some(size) = project.entity(id).map(|e| e.rect().size()) {
            project.move_entity(id, -size.to_vec2() / 2.0)?;
        }
        id
    };
    enter_section_under(project, id, at);
    Ok(vec![id])
}

fn enter_section_under(project: &mut Project, id: StageId, at: Point) {
    let Some(section) = project.sections_at(at).into_iter().find(|s| *s != id) else {
        return;
    };
    if let Err(e) = project.go_in_section(&[id], section) {
        log::warn!("pasted {id} could not enter section {section}: {e}");
    }
}

/// One paragraph per line, in the rich-text shape node details use.
fn text_to_details(text: &str) -> Vec<serde_json::Value> {
    text.lines()
        .map(|line| serde_json::json!({ "type": "p", "children": [{ "text": line }] }))
        .collect()
}

fn is_svg(text: &str) -> bool {
    let t = text.trim_start();
    t.starts_with("<svg") || (t.starts_with("<?xml") && t.contains("<svg"))
}

// ─── SVG size sniffing ───────────────────────────────────────────────────

fn attr_name<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '_')).parse_next(input)
}

fn attr_value<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .parse_next(input)
}

fn attribute<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str)> {
    preceded(
        multispace0,
        separated_pair(attr_name, (multispace0, '=', multispace0), attr_value),
    )
    .parse_next(input)
}

fn svg_attributes<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, &'a str)>> {
    preceded("<svg", repeat(0.., attribute)).parse_next(input)
}

/// Leading number of a length like `120`, `120.5px` or `80%`.
fn length(value: &str) -> Option<f64> {
    let mut rest = value.trim();
    let digits: &str = take_while::<_, _, ContextError>(1.., |c: char| c.is_ascii_digit() || c == '.')
        .parse_next(&mut rest)
        .ok()?;
    if rest.starts_with('%') {
        return None;
    }
    digits.parse::<f64>().ok().filter(|v| *v > 0.0)
}

/// `width`/`height` of the root `<svg>` element, when both are absolute.
pub fn svg_size(text: &str) -> Option<Size> {
    let start = text.find("<svg")?;
    let mut rest = &text[start..];
    let attrs = svg_attributes.parse_next(&mut rest).ok()?;
    let get = |name: &str| attrs.iter().find(|(k, _)| *k == name).and_then(|(_, v)| length(v));
    Some(Size::new(get("width")?, get("height")?))
}
