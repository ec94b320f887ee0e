//! The retrieval interface through which series and images are obtained.

use crate::image::PetImage;
use crate::series::{InstanceRef, Series};

/// A source of series descriptors and image slices.
///
/// Implementations may retrieve data from a PACS, a file system,
/// or memory. Both operations may block.
/// The evaluation never holds on to the returned values
/// beyond the evaluation of one series.
pub trait ImageProvider {
    /// The retrieval error type
    type Error: std::error::Error + 'static;

    /// List the series of a study, with their instances in order.
    fn list_series(&self, study: &str) -> Result<Vec<Series>, Self::Error>;

    /// Retrieve one image, including its pixel data.
    fn load_image(&self, instance: &InstanceRef) -> Result<PetImage, Self::Error>;
}

impl<P: ImageProvider + ?Sized> ImageProvider for &P {
    type Error = P::Error;

    fn list_series(&self, study: &str) -> Result<Vec<Series>, Self::Error> {
        (**self).list_series(study)
    }

    fn load_image(&self, instance: &InstanceRef) -> Result<PetImage, Self::Error> {
        (**self).load_image(instance)
    }
}
