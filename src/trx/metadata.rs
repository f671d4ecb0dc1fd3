//! Typed accessors for the root attributes. Writes go straight to the store.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::TrxFile;
use crate::constants::{ATTR_DIMENSIONS, ATTR_NB_POINTS, ATTR_NB_STREAMLINES, ATTR_VOXEL_TO_RASMM};
use crate::error::{Result, TrxError};
use crate::store::ArrayStoreExt;
use crate::types::{Affine, SpaceAttributes, SpatialReference};

impl TrxFile {
    fn root_attr<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let mut attrs = self.store()?.attrs("")?;
        let value = attrs.remove(key).ok_or_else(|| TrxError::InvalidMetadata {
            key: key.to_string(),
            reason: "missing".into(),
        })?;
        serde_json::from_value(value).map_err(|err| TrxError::InvalidMetadata {
            key: key.to_string(),
            reason: err.to_string(),
        })
    }

    fn set_root_attr(&mut self, key: &str, value: Value) -> Result<()> {
        self.store_mut()?.set_attr("", key, value)
    }

    /// Voxel-to-RAS+mm affine, row-major.
    pub fn affine(&self) -> Result<Affine> {
        self.root_attr(ATTR_VOXEL_TO_RASMM)
    }

    pub fn set_affine(&mut self, affine: Affine) -> Result<()> {
        self.set_root_attr(ATTR_VOXEL_TO_RASMM, serde_json::to_value(affine)?)
    }

    pub fn dimensions(&self) -> Result<[u16; 3]> {
        self.root_attr(ATTR_DIMENSIONS)
    }

    pub fn set_dimensions(&mut self, dimensions: [u16; 3]) -> Result<()> {
        self.set_root_attr(ATTR_DIMENSIONS, serde_json::to_value(dimensions)?)
    }

    pub fn nb_streamlines(&self) -> Result<u64> {
        self.root_attr(ATTR_NB_STREAMLINES)
    }

    pub fn set_nb_streamlines(&mut self, count: u64) -> Result<()> {
        self.set_root_attr(ATTR_NB_STREAMLINES, Value::from(count))
    }

    pub fn nb_points(&self) -> Result<u64> {
        self.root_attr(ATTR_NB_POINTS)
    }

    pub fn set_nb_points(&mut self, count: u64) -> Result<()> {
        self.set_root_attr(ATTR_NB_POINTS, Value::from(count))
    }

    pub fn space_attributes(&self) -> Result<SpaceAttributes> {
        Ok(SpaceAttributes::new(self.affine()?, self.dimensions()?))
    }

    pub fn set_space_attributes(&mut self, space: &SpaceAttributes) -> Result<()> {
        self.set_affine(space.affine)?;
        self.set_dimensions(space.dimensions)
    }
}

impl SpatialReference for TrxFile {
    fn space_attributes(&self) -> Result<SpaceAttributes> {
        TrxFile::space_attributes(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::store::{ArrayStoreExt, Backend};
    use crate::trx::TrxFile;
    use crate::types::{IDENTITY_AFFINE, TrxOptions};
    use crate::error::TrxError;
    use serde_json::Value;

    #[test]
    fn blank_attributes_round_trip() {
        let mut trx = TrxFile::create(Backend::memory(), TrxOptions::default()).unwrap();
        assert_eq!(trx.affine().unwrap(), IDENTITY_AFFINE);
        assert_eq!(trx.dimensions().unwrap(), [1, 1, 1]);
        assert_eq!(trx.nb_streamlines().unwrap(), 0);

        let mut affine = IDENTITY_AFFINE;
        affine[0][0] = -1.25;
        affine[1][3] = 0.1;
        trx.set_affine(affine).unwrap();
        trx.set_dimensions([96, 114, 96]).unwrap();
        trx.set_nb_points(42).unwrap();
        assert_eq!(trx.affine().unwrap(), affine);
        assert_eq!(trx.dimensions().unwrap(), [96, 114, 96]);
        assert_eq!(trx.nb_points().unwrap(), 42);
        trx.close().unwrap();
    }

    #[test]
    fn malformed_attributes_are_reported_by_key() {
        let mut trx = TrxFile::create(Backend::memory(), TrxOptions::default()).unwrap();
        trx.store_mut()
            .unwrap()
            .set_attr("", "DIMENSIONS", Value::from("large"))
            .unwrap();
        match trx.dimensions() {
            Err(TrxError::InvalidMetadata { key, .. }) => assert_eq!(key, "DIMENSIONS"),
            other => panic!("unexpected {other:?}"),
        }
        trx.close().unwrap();
    }
}
