use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// A folder as returned by a `LIST` query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FolderDescriptor {
    /// The absolute path of the folder, from the root of the hierarchy.
    pub path: String,
    /// The hierarchy delimiter used by the server. `None` means the namespace is flat.
    pub delimiter: Option<char>,
    /// Name and special-use attributes of the folder.
    pub flags: BTreeSet<FolderFlag>,
}

impl FolderDescriptor {
    pub fn new(path: impl Into<String>, delimiter: Option<char>) -> Self {
        FolderDescriptor {
            path: path.into(),
            delimiter,
            flags: BTreeSet::new(),
        }
    }

    pub fn with_flag(mut self, flag: FolderFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    /// Whether the folder may be selected (it is not `\Noselect`).
    pub fn is_selectable(&self) -> bool {
        !self.flags.contains(&FolderFlag::NoSelect)
    }
}

/// An attribute set for a folder, covering the RFC 3501 name attributes, the RFC 3348 child
/// attributes and the RFC 6154 special-use attributes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FolderFlag {
    NoInferiors,
    NoSelect,
    Marked,
    Unmarked,
    HasChildren,
    HasNoChildren,
    All,
    Archive,
    Drafts,
    Flagged,
    Junk,
    Sent,
    Trash,
    /// Any other attribute, without its leading backslash.
    Other(String),
}

impl FolderFlag {
    /// Parse an attribute as sent by the server, with or without the leading backslash.
    /// Attribute names are case-insensitive.
    pub fn from_attribute(attribute: &str) -> FolderFlag {
        let name = attribute.trim_start_matches('\\');
        match name.to_ascii_lowercase().as_str() {
            "noinferiors" => FolderFlag::NoInferiors,
            "noselect" | "nonexistent" => FolderFlag::NoSelect,
            "marked" => FolderFlag::Marked,
            "unmarked" => FolderFlag::Unmarked,
            "haschildren" => FolderFlag::HasChildren,
            "hasnochildren" => FolderFlag::HasNoChildren,
            "all" => FolderFlag::All,
            "archive" => FolderFlag::Archive,
            "drafts" => FolderFlag::Drafts,
            "flagged" => FolderFlag::Flagged,
            "junk" => FolderFlag::Junk,
            "sent" => FolderFlag::Sent,
            "trash" => FolderFlag::Trash,
            _ => FolderFlag::Other(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FolderFlag::NoInferiors => "Noinferiors",
            FolderFlag::NoSelect => "Noselect",
            FolderFlag::Marked => "Marked",
            FolderFlag::Unmarked => "Unmarked",
            FolderFlag::HasChildren => "HasChildren",
            FolderFlag::HasNoChildren => "HasNoChildren",
            FolderFlag::All => "All",
            FolderFlag::Archive => "Archive",
            FolderFlag::Drafts => "Drafts",
            FolderFlag::Flagged => "Flagged",
            FolderFlag::Junk => "Junk",
            FolderFlag::Sent => "Sent",
            FolderFlag::Trash => "Trash",
            FolderFlag::Other(name) => name,
        }
    }
}

impl fmt::Display for FolderFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\\{}", self.as_str())
    }
}

impl Serialize for FolderFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
