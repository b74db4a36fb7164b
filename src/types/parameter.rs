use crate::types::SqlValue;

/// Direction of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParameterDirection {
    /// Returns true if the parameter value is sent to the server.
    pub fn is_input(self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }
}

/// Declared type of a parameter, used by drivers that need a hint
/// when the value alone is not enough (for example a typed NULL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Double,
    String,
    Binary,
}

/// A fully specified parameter attached to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDescriptor {
    pub name: String,
    pub value: SqlValue,
    pub db_type: Option<DbType>,
    pub size: Option<u32>,
    pub direction: ParameterDirection,
}

/// An insertion-ordered name to value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    entries: Vec<(String, SqlValue)>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter. An existing entry with the same name keeps its
    /// position and has its value replaced.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for ParameterMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ParameterMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// A statically declared structure whose fields are bound as named parameters.
/// Usually implemented with [`record!`](crate::record).
pub trait Record {
    /// Field name and value pairs. Field names are used verbatim as parameter names.
    fn fields(&self) -> Vec<(&'static str, SqlValue)>;
}

/// Implements [`Record`] for a struct by listing the fields to bind.
///
/// ```
/// struct NewUser {
///     name: String,
///     age: i32,
/// }
///
/// dbexec::record!(NewUser { name, age });
/// ```
#[macro_export]
macro_rules! record {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::types::Record for $ty {
            fn fields(&self) -> ::std::vec::Vec<(&'static str, $crate::types::SqlValue)> {
                ::std::vec![
                    $((stringify!($field), $crate::types::SqlValue::from(self.$field.clone()))),+
                ]
            }
        }
    };
}

/// The shapes a command's parameters can be supplied in.
///
/// Binding order follows the source's own iteration order. Callers should not
/// rely on that order for correctness; parameters are matched by name.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSource {
    Map(ParameterMap),
    Record(Vec<(&'static str, SqlValue)>),
}

impl ParameterSource {
    pub fn from_record<R: Record + ?Sized>(record: &R) -> Self {
        ParameterSource::Record(record.fields())
    }

    /// Name and value pairs in iteration order.
    pub fn entries(&self) -> Vec<(&str, &SqlValue)> {
        match self {
            ParameterSource::Map(map) => map.iter().collect(),
            ParameterSource::Record(fields) => fields.iter().map(|(n, v)| (*n, v)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ParameterSource::Map(map) => map.len(),
            ParameterSource::Record(fields) => fields.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<ParameterMap> for ParameterSource {
    fn from(map: ParameterMap) -> Self {
        ParameterSource::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Login {
        user: String,
        attempts: i32,
        note: Option<String>,
    }

    crate::record!(Login { user, attempts, note });

    #[test]
    fn test_parameter_map_keeps_insertion_order_and_replaces() {
        let map = ParameterMap::new()
            .with("b", 1)
            .with("a", "x")
            .with("b", 2);
        let entries: Vec<_> = map.iter().collect();
        assert_eq!(
            entries,
            vec![("b", &SqlValue::Int32(2)), ("a", &SqlValue::from("x"))]
        );
    }

    #[test]
    fn test_record_fields_use_field_names() {
        let login = Login {
            user: "ann".to_string(),
            attempts: 3,
            note: None,
        };
        let source = ParameterSource::from_record(&login);
        assert_eq!(source.len(), 3);
        let mut names: Vec<_> = source.entries().into_iter().map(|(n, _)| n).collect();
        names.sort();
        assert_eq!(names, vec!["attempts", "note", "user"]);
        assert_eq!(
            source
                .entries()
                .into_iter()
                .find(|(n, _)| *n == "note")
                .map(|(_, v)| v.clone()),
            Some(SqlValue::Null)
        );
    }
}
