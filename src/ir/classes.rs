//! Class lists: the mapping between label strings and integer class indices
//! that YOLO needs and the IR deliberately does not carry.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::model::ImageRecord;
use crate::error::UnilabelError;

/// File name of the plain-text class list in a YOLO directory.
pub const CLASSES_TXT: &str = "classes.txt";

/// An ordered list of class names. The position of a name is its YOLO class
/// index; COCO category ids are the position plus one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassList {
    names: Vec<String>,
    index: BTreeMap<String, usize>,
}

impl ClassList {
    /// Builds a class list from names in index order.
    ///
    /// If a name occurs more than once, lookups resolve to its first position.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut index = BTreeMap::new();
        for (position, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(position);
        }
        Self { names, index }
    }

    /// Derives a class list from every distinct label in `records`, sorted
    /// lexicographically so the result does not depend on record order.
    pub fn derive(records: &[ImageRecord]) -> Self {
        let labels: BTreeSet<&str> = records
            .iter()
            .flat_map(|record| record.bboxes.iter().map(|bbox| bbox.label.as_str()))
            .collect();
        Self::new(labels)
    }

    /// Reads a class list from `classes.txt` (one name per line) or from an
    /// Ultralytics `data.yaml` / `.yml` file (`names` key).
    pub fn read(path: &Path) -> Result<Self, UnilabelError> {
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        let data = fs::read_to_string(path).map_err(|source| UnilabelError::io_at(path, source))?;
        if is_yaml {
            parse_data_yaml(&data, path)
        } else {
            Ok(parse_classes_txt(&data))
        }
    }

    /// Writes the list as `classes.txt` content (one name per line).
    ///
    /// # Errors
    /// Returns [`UnilabelError::ClassListInvalid`] if a name would not read
    /// back unchanged, since that shifts every later class index.
    pub fn write(&self, path: &Path) -> Result<(), UnilabelError> {
        if let Some(name) = self.names.iter().find(|name| !is_storable_class_name(name)) {
            return Err(UnilabelError::ClassListInvalid {
                path: path.to_path_buf(),
                message: format!("class name {name:?} cannot be stored on one trimmed line"),
            });
        }
        fs::write(path, self.to_classes_txt()).map_err(|source| UnilabelError::io_at(path, source))
    }

    /// Renders the list as `classes.txt` content.
    pub fn to_classes_txt(&self) -> String {
        let mut out = String::new();
        for name in &self.names {
            out.push_str(name);
            out.push('\n');
        }
        out
    }

    /// Class index of `label`, if present.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Class name at `index`, if in range.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Returns true if `name` survives a `classes.txt` write and read unchanged:
/// non-empty, no line breaks, no leading or trailing whitespace.
pub fn is_storable_class_name(name: &str) -> bool {
    !name.is_empty() && name.trim() == name && !name.contains(['\n', '\r'])
}

/// Parses `classes.txt` content. Blank lines are skipped, names are trimmed.
pub fn parse_classes_txt(data: &str) -> ClassList {
    ClassList::new(
        data.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty()),
    )
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

fn parse_data_yaml(data: &str, path: &Path) -> Result<ClassList, UnilabelError> {
    let parsed: DataYaml =
        serde_yaml::from_str(data).map_err(|source| UnilabelError::ClassListYamlParse {
            path: path.to_path_buf(),
            source,
        })?;

    let names = match parsed.names {
        DataYamlNames::Sequence(names) => names,
        DataYamlNames::Mapping(mapping) => {
            let expected: Vec<usize> = (0..mapping.len()).collect();
            let actual: Vec<usize> = mapping.keys().copied().collect();
            if actual != expected {
                return Err(UnilabelError::ClassListInvalid {
                    path: path.to_path_buf(),
                    message: "names mapping must use contiguous indices starting at 0".to_string(),
                });
            }
            mapping.into_values().collect()
        }
    };

    Ok(ClassList::new(names))
}
