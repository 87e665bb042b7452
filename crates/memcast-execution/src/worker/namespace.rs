use std::collections::HashMap;
use std::sync::Mutex;

use crate::memmap::MappedArray;

/// The named bindings of a worker process.
pub struct Namespace {
    bindings: Mutex<HashMap<String, MappedArray>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Binds the array to the name, replacing any previous binding.
    pub fn bind(&self, name: impl Into<String>, value: MappedArray) {
        let mut bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
        bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<MappedArray> {
        let bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
        bindings.get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<MappedArray> {
        let mut bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
        bindings.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
        let mut names = bindings.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{ArrayData, Order};
    use crate::error::ExecutionResult;
    use crate::memmap::{load_memmap, save_for_memmap};

    #[test]
    fn test_bind_and_replace() -> ExecutionResult<()> {
        let dir = tempfile::tempdir()?;
        let first = ArrayData::from_f64(vec![2], Order::C, &[1.0, 2.0])?;
        let second = ArrayData::from_f64(vec![2], Order::C, &[3.0, 4.0])?;
        let (p1, p2) = (dir.path().join("a"), dir.path().join("b"));
        save_for_memmap(first.as_bytes(), &p1)?;
        save_for_memmap(second.as_bytes(), &p2)?;

        let namespace = Namespace::new();
        assert!(namespace.get("X").is_none());
        namespace.bind("X", load_memmap(&p1, first.layout())?);
        namespace.bind("X", load_memmap(&p2, second.layout())?);
        namespace.bind("Y", load_memmap(&p1, first.layout())?);
        assert_eq!(namespace.names(), vec!["X".to_string(), "Y".to_string()]);
        assert_eq!(
            namespace.get("X").map(|x| x.as_bytes().to_vec()),
            Some(second.as_bytes().to_vec())
        );
        assert!(namespace.remove("Y").is_some());
        assert_eq!(namespace.names(), vec!["X".to_string()]);
        Ok(())
    }
}
