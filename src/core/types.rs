// Column type tags and the byte layout each tag uses on disk.
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ColumnType {
    Null,
    String,
    Double,
    Int,
    Float,
    Boolean,
    Date,
    Long,
    Byte,
    IndexList,
    WeightedIndexList,
    Vector,
    Matrix,
    Tensor,
    /// A tag this reader does not know. Cells decode as null and consume no bytes.
    Unknown(u8),
}

/// How a cell of a given type is laid out in the data stream.
///
/// Read and skip both derive byte counts from this description, so they cannot
/// disagree about where the next cell starts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Layout {
    Empty,
    Fixed(usize),
    /// 7-bit varint byte length, then UTF-8.
    Utf8,
    /// `dims` little-endian i32 extents, then `product(extents)` elements.
    Counted { dims: usize, element: usize },
}

impl ColumnType {
    pub const ALL: [ColumnType; 14] = [
        ColumnType::Null,
        ColumnType::String,
        ColumnType::Double,
        ColumnType::Int,
        ColumnType::Float,
        ColumnType::Boolean,
        ColumnType::Date,
        ColumnType::Long,
        ColumnType::Byte,
        ColumnType::IndexList,
        ColumnType::WeightedIndexList,
        ColumnType::Vector,
        ColumnType::Matrix,
        ColumnType::Tensor,
    ];

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ColumnType::Null,
            1 => ColumnType::String,
            2 => ColumnType::Double,
            3 => ColumnType::Int,
            4 => ColumnType::Float,
            5 => ColumnType::Boolean,
            6 => ColumnType::Date,
            7 => ColumnType::Long,
            8 => ColumnType::Byte,
            9 => ColumnType::IndexList,
            10 => ColumnType::WeightedIndexList,
            11 => ColumnType::Vector,
            12 => ColumnType::Matrix,
            13 => ColumnType::Tensor,
            other => ColumnType::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ColumnType::Null => 0,
            ColumnType::String => 1,
            ColumnType::Double => 2,
            ColumnType::Int => 3,
            ColumnType::Float => 4,
            ColumnType::Boolean => 5,
            ColumnType::Date => 6,
            ColumnType::Long => 7,
            ColumnType::Byte => 8,
            ColumnType::IndexList => 9,
            ColumnType::WeightedIndexList => 10,
            ColumnType::Vector => 11,
            ColumnType::Matrix => 12,
            ColumnType::Tensor => 13,
            ColumnType::Unknown(code) => code,
        }
    }

    pub fn layout(self) -> Layout {
        match self {
            ColumnType::Null | ColumnType::Unknown(_) => Layout::Empty,
            ColumnType::Boolean | ColumnType::Byte => Layout::Fixed(1),
            ColumnType::Int | ColumnType::Float => Layout::Fixed(4),
            ColumnType::Double | ColumnType::Long | ColumnType::Date => Layout::Fixed(8),
            ColumnType::String => Layout::Utf8,
            ColumnType::IndexList | ColumnType::Vector => Layout::Counted {
                dims: 1,
                element: 4,
            },
            ColumnType::WeightedIndexList => Layout::Counted {
                dims: 1,
                element: 8,
            },
            ColumnType::Matrix => Layout::Counted {
                dims: 2,
                element: 4,
            },
            ColumnType::Tensor => Layout::Counted {
                dims: 3,
                element: 4,
            },
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Double
                | ColumnType::Float
                | ColumnType::Int
                | ColumnType::Long
                | ColumnType::Byte
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Null => "null",
            ColumnType::String => "string",
            ColumnType::Double => "double",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Long => "long",
            ColumnType::Byte => "byte",
            ColumnType::IndexList => "index-list",
            ColumnType::WeightedIndexList => "weighted-index-list",
            ColumnType::Vector => "vector",
            ColumnType::Matrix => "matrix",
            ColumnType::Tensor => "tensor",
            ColumnType::Unknown(_) => "unknown",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        ColumnType::ALL
            .into_iter()
            .find(|column_type| column_type.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Unknown(code) => write!(f, "unknown({code})"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnType, Layout};

    #[test]
    fn codes_are_stable_and_reversible() {
        for (code, column_type) in ColumnType::ALL.into_iter().enumerate() {
            assert_eq!(column_type.code() as usize, code);
            assert_eq!(ColumnType::from_code(code as u8), column_type);
        }
        assert_eq!(ColumnType::from_code(200), ColumnType::Unknown(200));
        assert_eq!(ColumnType::Unknown(200).code(), 200);
    }

    #[test]
    fn unknown_tags_take_no_space() {
        assert_eq!(ColumnType::Unknown(77).layout(), Layout::Empty);
    }

    #[test]
    fn names_parse_back() {
        for column_type in ColumnType::ALL {
            assert_eq!(ColumnType::parse(column_type.name()), Some(column_type));
        }
        assert_eq!(ColumnType::parse("DOUBLE"), Some(ColumnType::Double));
        assert_eq!(ColumnType::parse("decimal"), None);
    }
}
