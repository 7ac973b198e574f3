use log::info;

use crate::face::{Face, FaceError, FaceId};

/// Owns every registered face. Everything else refers to faces by id.
#[derive(Default)]
pub struct FaceTable {
    // Kept sorted by id, which holds because new ids are always larger
    faces: Vec<(FaceId, Face)>,
    latest_face_id: u64,
}

impl FaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mut face: Face) -> Result<FaceId, FaceError> {
        let id = FaceId(
            self.latest_face_id
                .checked_add(1)
                .ok_or(FaceError::IdsExhausted)?,
        );
        self.latest_face_id = id.0;
        face.set_id(id);
        info!(
            "Added face {} remote={} local={}",
            id,
            face.remote_uri(),
            face.local_uri()
        );
        self.faces.push((id, face));
        Ok(id)
    }

    /// Takes the face out of the table. Its id is never handed out again.
    pub fn remove(&mut self, id: FaceId) -> Option<Face> {
        let idx = self.find_face(id)?;
        let (_, face) = self.faces.remove(idx);
        info!("Removed face {}", id);
        Some(face)
    }

    pub fn get(&self, id: FaceId) -> Option<&Face> {
        let idx = self.find_face(id)?;
        Some(&self.faces[idx].1)
    }

    pub fn get_mut(&mut self, id: FaceId) -> Option<&mut Face> {
        let idx = self.find_face(id)?;
        Some(&mut self.faces[idx].1)
    }

    pub fn contains(&self, id: FaceId) -> bool {
        self.find_face(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Face> {
        self.faces.iter().map(|(_, face)| face)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Face> {
        self.faces.iter_mut().map(|(_, face)| face)
    }

    pub fn ids(&self) -> Vec<FaceId> {
        self.faces.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    fn find_face(&self, id: FaceId) -> Option<usize> {
        self.faces.binary_search_by_key(&id, |(f, _)| *f).ok()
    }
}
