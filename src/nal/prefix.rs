//! Prefix NAL unit, `prefix_nal_unit_rbsp()` (NAL type 14).
//!
//! In an MVC stream the prefix precedes each base view slice and carries the header extension
//! the base view's own slice units lack, so the base view's `view_id` is taken from here. The
//! SVC body that may follow is not read.

use super::{MvcHeader, NalHeaderExtension};
use crate::rbsp::{BitRead, BitReaderError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixNalUnit {
    pub header_extension: NalHeaderExtension,
}
impl PrefixNalUnit {
    /// Reads the three-byte header extension following the NAL header byte.
    pub fn read<R: BitRead>(r: &mut R) -> Result<PrefixNalUnit, BitReaderError> {
        Ok(PrefixNalUnit {
            header_extension: NalHeaderExtension::read(r)?,
        })
    }

    pub fn mvc(&self) -> Option<&MvcHeader> {
        self.header_extension.mvc()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rbsp::BitReader;
    use crate::testutil;

    #[test]
    fn base_view_prefix() {
        let nal = testutil::mvc_nal(3, 14, false, 0, true, &[]);
        let prefix = PrefixNalUnit::read(&mut BitReader::new(&nal[1..])).unwrap();
        let mvc = prefix.mvc().unwrap();
        assert_eq!(mvc.view_id, 0);
        assert!(!mvc.non_idr_flag);
        assert!(mvc.anchor_pic_flag);
    }

    #[test]
    fn svc_prefix() {
        let data = [0x80, 0x00, 0x00, 0x80];
        let prefix = PrefixNalUnit::read(&mut BitReader::new(&data[..])).unwrap();
        assert_eq!(prefix.mvc(), None);
    }
}
