use crate::domain::document::{Document, Folder};
use crate::domain::error::DomainError;

/// Collects one folder per requested layer and emits them in request order,
/// whatever order they were produced in.
#[derive(Debug)]
pub struct DocumentComposer {
    title: Option<String>,
    slots: Vec<Option<Folder>>,
}

impl DocumentComposer {
    pub fn new(title: Option<String>, layer_count: usize) -> Self {
        Self {
            title,
            slots: vec![None; layer_count],
        }
    }

    pub fn insert(&mut self, index: usize, folder: Folder) -> Result<(), DomainError> {
        let count = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            DomainError::invariant(format!("folder index {index} out of range for {count} layers"))
        })?;
        if slot.is_some() {
            return Err(DomainError::invariant(format!(
                "folder for layer {index} composed twice"
            )));
        }
        *slot = Some(folder);
        Ok(())
    }

    pub fn finish(self) -> Result<Document, DomainError> {
        let folders = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| DomainError::invariant(format!("layer {index} has no folder")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Document::new(self.title, folders))
    }
}
