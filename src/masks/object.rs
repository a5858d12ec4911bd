//! Object mask taken from the region detector

use super::{GeneratorInput, MaskGenerator, MaskOutput};
use crate::{error::Result, types::MaskKind};

/// Background likelihood straight from the subject stamp
///
/// The subject mask already uses the background-likelihood convention
/// (region bounds 0, everything else 255), so it is passed through as is.
pub struct ObjectMaskGenerator;

impl MaskGenerator for ObjectMaskGenerator {
    fn kind(&self) -> MaskKind {
        MaskKind::Object
    }

    fn generate(&self, input: &GeneratorInput<'_>) -> Result<MaskOutput> {
        Ok(input.detection.subject_mask.clone().into())
    }
}
