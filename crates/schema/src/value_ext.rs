use value::{ConstValue, Name};

pub trait ValueExt {
    /// Follows `path` through nested objects.
    ///
    /// Returns `None` when a segment is missing or an intermediate value is
    /// not an object; an explicit `null` at the end is returned as is.
    fn get_path(&self, path: &[Name]) -> Option<&ConstValue>;

    fn typename(&self) -> Option<&str>;
}

impl ValueExt for ConstValue {
    fn get_path(&self, path: &[Name]) -> Option<&ConstValue> {
        let mut current = self;
        for name in path {
            match current {
                ConstValue::Object(object) => current = object.get(name)?,
                _ => return None,
            }
        }
        Some(current)
    }

    fn typename(&self) -> Option<&str> {
        match self {
            ConstValue::Object(object) => match object.get("__typename") {
                Some(ConstValue::String(typename)) => Some(typename.as_str()),
                _ => None,
            },
            _ => None,
        }
    }
}
