//! Content kinds and their schema profiles.
//!
//! Each kind maps to one static [`KindProfile`] describing the body shape the validation
//! layers enforce. The table is fixed at compile time; lookups never consult strings.

use serde::{Deserialize, Serialize};

/// Category of generated content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Article,
    Quiz,
    Course,
    VideoScript,
    TranscriptCorrection,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        ContentKind::Article,
        ContentKind::Quiz,
        ContentKind::Course,
        ContentKind::VideoScript,
        ContentKind::TranscriptCorrection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Article => "article",
            ContentKind::Quiz => "quiz",
            ContentKind::Course => "course",
            ContentKind::VideoScript => "video_script",
            ContentKind::TranscriptCorrection => "transcript_correction",
        }
    }

    pub fn profile(self) -> &'static KindProfile {
        match self {
            ContentKind::Article => &ARTICLE,
            ContentKind::Quiz => &QUIZ,
            ContentKind::Course => &COURSE,
            ContentKind::VideoScript => &VIDEO_SCRIPT,
            ContentKind::TranscriptCorrection => &TRANSCRIPT_CORRECTION,
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ContentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown content kind '{}'", s))
    }
}

/// JSON value category a field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Number,
    Boolean,
    List,
}

impl FieldType {
    pub fn describe(self) -> &'static str {
        match self {
            FieldType::Text => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::List => "array",
        }
    }
}

/// A required field and its content bounds.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    /// Minimum characters (text) or entries (list) for the quality layer.
    pub min_len: usize,
    /// Maximum characters enforced by the constraint layer.
    pub max_chars: Option<usize>,
    /// Allowed values for enumerated text fields.
    pub allowed: &'static [&'static str],
}

const fn text(name: &'static str, min_len: usize, max_chars: Option<usize>) -> FieldSpec {
    FieldSpec {
        name,
        ty: FieldType::Text,
        min_len,
        max_chars,
        allowed: &[],
    }
}

const fn choice(name: &'static str, allowed: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        ty: FieldType::Text,
        min_len: 0,
        max_chars: None,
        allowed,
    }
}

const fn typed(name: &'static str, ty: FieldType, min_len: usize) -> FieldSpec {
    FieldSpec {
        name,
        ty,
        min_len,
        max_chars: None,
        allowed: &[],
    }
}

/// Repeated structural sub-elements (sections, questions, modules, entries).
#[derive(Debug, Clone, Copy)]
pub struct ElementSpec {
    pub list_field: &'static str,
    pub label: &'static str,
    pub min_count: usize,
    pub fields: &'static [FieldSpec],
    /// Field whose value must be unique across elements.
    pub unique_by: Option<&'static str>,
}

/// Writing register a kind requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Instructional,
    Any,
}

/// Schema and quality expectations for one content kind.
#[derive(Debug)]
pub struct KindProfile {
    pub kind: ContentKind,
    pub fields: &'static [FieldSpec],
    pub elements: Option<ElementSpec>,
    pub register: Register,
    /// Inclusive word-count bounds for one text field.
    pub word_bounds: Option<(&'static str, usize, usize)>,
    /// Fields the publish collaborator keys on.
    pub publish_fields: &'static [&'static str],
}

const LEVELS: &[&str] = &["beginner", "intermediate", "advanced"];

static ARTICLE: KindProfile = KindProfile {
    kind: ContentKind::Article,
    fields: &[
        text("title", 10, Some(120)),
        text("summary", 40, Some(600)),
        typed("sections", FieldType::List, 0),
    ],
    elements: Some(ElementSpec {
        list_field: "sections",
        label: "section",
        min_count: 3,
        fields: &[text("heading", 3, Some(120)), text("body", 80, None)],
        unique_by: Some("heading"),
    }),
    register: Register::Any,
    word_bounds: None,
    publish_fields: &["title"],
};

static QUIZ: KindProfile = KindProfile {
    kind: ContentKind::Quiz,
    fields: &[
        text("title", 5, Some(120)),
        choice("difficulty", LEVELS),
        typed("questions", FieldType::List, 0),
    ],
    elements: Some(ElementSpec {
        list_field: "questions",
        label: "question",
        min_count: 5,
        fields: &[
            text("prompt", 10, Some(500)),
            typed("options", FieldType::List, 2),
            typed("answer", FieldType::Integer, 0),
        ],
        unique_by: Some("prompt"),
    }),
    register: Register::Instructional,
    word_bounds: None,
    publish_fields: &["title"],
};

static COURSE: KindProfile = KindProfile {
    kind: ContentKind::Course,
    fields: &[
        text("title", 5, Some(120)),
        text("description", 60, Some(2000)),
        choice("level", LEVELS),
        typed("modules", FieldType::List, 0),
    ],
    elements: Some(ElementSpec {
        list_field: "modules",
        label: "module",
        min_count: 3,
        fields: &[
            text("title", 5, Some(120)),
            typed("objectives", FieldType::List, 1),
            typed("duration_minutes", FieldType::Integer, 0),
        ],
        unique_by: Some("title"),
    }),
    register: Register::Instructional,
    word_bounds: None,
    publish_fields: &["title"],
};

static VIDEO_SCRIPT: KindProfile = KindProfile {
    kind: ContentKind::VideoScript,
    fields: &[
        text("title", 5, Some(100)),
        text("topic", 3, Some(200)),
        text("script", 200, None),
    ],
    elements: None,
    register: Register::Any,
    word_bounds: Some(("script", 100, 120)),
    publish_fields: &["title"],
};

static TRANSCRIPT_CORRECTION: KindProfile = KindProfile {
    kind: ContentKind::TranscriptCorrection,
    fields: &[
        text("source_ref", 1, Some(256)),
        typed("entries", FieldType::List, 0),
    ],
    elements: Some(ElementSpec {
        list_field: "entries",
        label: "entry",
        min_count: 1,
        fields: &[
            text("timestamp", 1, None),
            text("original_text", 1, None),
            text("corrected_text", 1, None),
            typed("needs_review", FieldType::Boolean, 0),
        ],
        unique_by: Some("timestamp"),
    }),
    register: Register::Any,
    word_bounds: None,
    publish_fields: &["source_ref"],
};
