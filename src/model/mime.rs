//! Transport-neutral MIME part tree.
//!
//! Both the IMAP `BODYSTRUCTURE` response and a locally parsed message are
//! converted into this shape, numbered with IMAP section identifiers, so the
//! attachment selection logic never depends on where the tree came from.

/// One node of a message's MIME structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// IMAP section number. Empty for a multipart root (the message itself).
    pub part_id: String,
    /// Lowercase `type/subtype`.
    pub media_type: String,
    /// Lowercase disposition type (`attachment`, `inline`), if the part declares one.
    pub disposition: Option<String>,
    /// Decoded filename from the disposition or content-type parameters.
    pub filename: Option<String>,
    /// Size in bytes as known to the source.
    pub size: u64,
    /// Children of a multipart node, in order.
    pub children: Vec<MimePart>,
}

impl MimePart {
    /// A single-part node.
    pub fn leaf(part_id: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            part_id: part_id.into(),
            media_type: media_type.into().to_ascii_lowercase(),
            disposition: None,
            filename: None,
            size: 0,
            children: Vec::new(),
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.media_type.starts_with("multipart/")
    }

    /// Top-level media type (`application` for `application/pdf`).
    pub fn main_type(&self) -> &str {
        self.media_type
            .split('/')
            .next()
            .unwrap_or(self.media_type.as_str())
    }

    /// Leaf parts in depth-first (part-tree traversal) order.
    pub fn leaves(&self) -> Vec<&MimePart> {
        let mut out = Vec::new();
        collect_leaves(self, &mut out);
        out
    }

    /// Find a node by section identifier.
    pub fn find(&self, part_id: &str) -> Option<&MimePart> {
        if self.part_id == part_id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(part_id))
    }
}

fn collect_leaves<'a>(part: &'a MimePart, out: &mut Vec<&'a MimePart>) {
    if part.is_multipart() {
        for child in &part.children {
            collect_leaves(child, out);
        }
    } else {
        out.push(part);
    }
}

/// Section identifier of the `index`-th (1-based) child of `parent`.
pub fn child_part_id(parent: &str, index: usize) -> String {
    if parent.is_empty() {
        index.to_string()
    } else {
        format!("{parent}.{index}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> MimePart {
        let mut root = MimePart::leaf("", "multipart/mixed");
        let mut alt = MimePart::leaf("1", "multipart/alternative");
        alt.children = vec![
            MimePart::leaf("1.1", "text/plain"),
            MimePart::leaf("1.2", "text/html"),
        ];
        root.children = vec![alt, MimePart::leaf("2", "application/vnd.ms-excel")];
        root
    }

    #[test]
    fn test_child_part_id() {
        assert_eq!(child_part_id("", 2), "2");
        assert_eq!(child_part_id("1", 3), "1.3");
        assert_eq!(child_part_id("2.1", 1), "2.1.1");
    }

    #[test]
    fn test_leaves_in_traversal_order() {
        let root = tree();
        let ids: Vec<&str> = root.leaves().iter().map(|p| p.part_id.as_str()).collect();
        assert_eq!(ids, vec!["1.1", "1.2", "2"]);
    }

    #[test]
    fn test_find_and_main_type() {
        let root = tree();
        let part = root.find("2").expect("part 2");
        assert_eq!(part.main_type(), "application");
        assert!(root.find("3").is_none());
        assert!(root.find("1").is_some_and(MimePart::is_multipart));
    }
}
