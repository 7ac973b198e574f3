use crate::face::{Face, FaceError, FacePersistency, FaceReceiver, FaceScope, FaceSender};

/// Swallows everything it is given.
pub struct NullSender;

/// Never receives anything.
pub struct NullReceiver;

impl FaceSender for NullSender {
    fn send(&mut self, _packet: &[u8]) -> Result<(), FaceError> {
        Ok(())
    }
}

impl FaceReceiver for NullReceiver {
    fn try_recv(&mut self) -> Result<Option<Vec<u8>>, FaceError> {
        Ok(None)
    }
}

pub fn null_face() -> Face {
    Face::new(NullSender, NullReceiver)
        .with_uris("null://", "null://")
        .with_scope(FaceScope::Local)
        .with_persistency(FacePersistency::Persistent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Data;

    #[test]
    fn test_null_face_is_a_sink() {
        let mut face = null_face();
        face.set_up(true);
        let data = Data::new("/a".parse().unwrap(), vec![]);
        face.send_data(&data).unwrap();
        assert_eq!(face.flush(), Ok(1));
        assert_eq!(face.counters().n_out_data, 1);
        assert_eq!(face.try_recv(), Ok(None));
    }
}
