use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseLabelError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(CaseId);
id_newtype!(DocumentId);

/// Declares a closed enumeration whose wire form is a human-readable label.
///
/// The generated `ALL` slice is the only option list a front end should
/// offer, and the only set `FromStr`/`Deserialize` accept. `FromStr` is
/// forgiving about case and surrounding whitespace for typed input; the wire
/// form must match a label exactly.
macro_rules! labeled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Exact label match, as used for wire values.
            pub fn from_label(raw: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|candidate| candidate.label() == raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = ParseLabelError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                let trimmed = raw.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.label().eq_ignore_ascii_case(trimmed))
                    .ok_or_else(|| ParseLabelError::new(stringify!($name), raw))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::from_label(&raw).ok_or_else(|| {
                    serde::de::Error::custom(ParseLabelError::new(stringify!($name), raw))
                })
            }
        }
    };
}

labeled_enum!(
    /// Lifecycle stage of a foreclosure case.
    CaseStatus {
        New => "New",
        DemandLetterSent => "Demand Letter Sent",
        PetitionFiled => "Petition Filed",
        OrderNisiGranted => "Order Nisi Granted",
        RedemptionPeriod => "Redemption Period",
        SaleProcess => "Sale Process",
        Closed => "Closed",
    }
);

impl Default for CaseStatus {
    fn default() -> Self {
        Self::New
    }
}

labeled_enum!(
    /// Category tag attached to an uploaded case document.
    DocumentType {
        DemandLetter => "Demand Letter",
        Petition => "Petition",
        OrderNisi => "Order Nisi",
        NoticeOfSale => "Notice of Sale",
        Affidavit => "Affidavit",
        Correspondence => "Correspondence",
        Other => "Other",
    }
);

labeled_enum!(
    DocumentStatus {
        Draft => "Draft",
        Finalized => "Finalized",
    }
);

/// Location of a binary payload inside the document bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    /// `{case_id}/{name}`, the only layout documents are stored under.
    pub fn for_document(case_id: &CaseId, name: &str) -> Self {
        Self(format!("{}/{}", case_id.as_str(), name))
    }

    pub fn from_stored(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
