use std::fmt;

/// Declared type of one field of a [`FactShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    String,
    /// A string restricted to the listed variant names.
    Enum(Vec<String>),
    /// A nested object of another declared shape.
    Shape(String),
}

impl FieldType {
    /// Resolve a type name as written in rule text. Unknown names are assumed
    /// to refer to shapes; the compiler reports the ones that are not declared.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "int" | "long" => FieldType::Int,
            "float" | "double" => FieldType::Float,
            "bool" | "boolean" => FieldType::Bool,
            "string" | "String" => FieldType::String,
            other => FieldType::Shape(other.to_owned()),
        }
    }

    /// Whether the type holds a single scalar [`Value`](super::Value).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldType::Shape(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "int"),
            FieldType::Float => write!(f, "float"),
            FieldType::Bool => write!(f, "bool"),
            FieldType::String => write!(f, "string"),
            FieldType::Enum(variants) => write!(f, "enum({})", variants.join(", ")),
            FieldType::Shape(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: FieldType,
}

/// A structural type that rules match against. Request parameters are mapped
/// onto it field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactShape {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

impl FactShape {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Shapes declared under one `package`, and whether that package carries any rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactGroup {
    pub package: String,
    pub shapes: Vec<FactShape>,
    pub has_rules: bool,
}

/// Find a shape by name across all groups.
#[must_use]
pub fn find_shape<'a>(groups: &'a [FactGroup], name: &str) -> Option<&'a FactShape> {
    groups
        .iter()
        .flat_map(|g| g.shapes.iter())
        .find(|s| s.name == name)
}
