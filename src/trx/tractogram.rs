//! In-memory curve collection with its own coordinate space, and the bridge to `TrxFile`.
//!
//! A container always stores positions in RAS+mm with voxel-center origin. A
//! [`Tractogram`] may sit in any [`Space`]/[`Origin`]; import normalises it for the
//! duration of the copy and puts it back afterwards, even when the copy fails.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{TrxFile, point_path, streamline_path};
use crate::constants::{OFFSETS, POSITIONS};
use crate::error::{Result, TrxError};
use crate::offsets::{OffsetIndex, RaggedArray};
use crate::store::{ArrayStoreExt, Backend};
use crate::types::space::apply_affine;
use crate::types::{ChunkClass, NdArray, SpaceAttributes, SpatialReference, TrxOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Space {
    /// World coordinates, millimetres.
    Rasmm,
    /// Voxel coordinates scaled by voxel size.
    Voxmm,
    /// Voxel coordinates.
    Vox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Integer voxel coordinates fall on voxel centers.
    Center,
    /// Integer voxel coordinates fall on voxel corners.
    Corner,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tractogram {
    space_attributes: SpaceAttributes,
    space: Space,
    origin: Origin,
    points: Vec<[f32; 3]>,
    index: OffsetIndex,
    data_per_point: BTreeMap<String, NdArray>,
    data_per_streamline: BTreeMap<String, NdArray>,
}

#[allow(clippy::wrong_self_convention)]
impl Tractogram {
    /// `streamlines` must hold numeric N×3 points.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(
        space_attributes: SpaceAttributes,
        space: Space,
        origin: Origin,
        streamlines: RaggedArray,
    ) -> Result<Self> {
        let (data, index) = streamlines.into_parts();
        if data.trailing_shape() != [3] {
            return Err(TrxError::ShapeMismatch {
                path: POSITIONS.to_string(),
                reason: format!("points must be N×3, got {:?}", data.shape()),
            });
        }
        let points = data
            .to_f64_vec()?
            .chunks_exact(3)
            .map(|xyz| [xyz[0] as f32, xyz[1] as f32, xyz[2] as f32])
            .collect();
        Ok(Self {
            space_attributes,
            space,
            origin,
            points,
            index,
            data_per_point: BTreeMap::new(),
            data_per_streamline: BTreeMap::new(),
        })
    }

    /// Attach a per-point array with one row per point.
    pub fn with_data_per_point(mut self, key: &str, data: NdArray) -> Result<Self> {
        if data.rows() != self.points.len() {
            return Err(TrxError::ShapeMismatch {
                path: point_path(key),
                reason: format!("{} rows for {} points", data.rows(), self.points.len()),
            });
        }
        self.data_per_point.insert(key.to_string(), data);
        Ok(self)
    }

    /// Attach a per-streamline array with one row per streamline.
    pub fn with_data_per_streamline(mut self, key: &str, data: NdArray) -> Result<Self> {
        if data.rows() != self.index.len() {
            return Err(TrxError::ShapeMismatch {
                path: streamline_path(key),
                reason: format!("{} rows for {} streamlines", data.rows(), self.index.len()),
            });
        }
        self.data_per_streamline.insert(key.to_string(), data);
        Ok(self)
    }

    #[must_use]
    pub fn space(&self) -> Space {
        self.space
    }

    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    #[must_use]
    pub fn offset_index(&self) -> &OffsetIndex {
        &self.index
    }

    pub fn streamlines(&self) -> Result<RaggedArray> {
        RaggedArray::new(NdArray::from_rows(&self.points), self.index.clone())
    }

    #[must_use]
    pub fn data_per_point(&self) -> &BTreeMap<String, NdArray> {
        &self.data_per_point
    }

    #[must_use]
    pub fn data_per_streamline(&self) -> &BTreeMap<String, NdArray> {
        &self.data_per_streamline
    }

    #[allow(clippy::cast_possible_truncation)]
    fn transform(&mut self, f: impl Fn([f64; 3]) -> [f64; 3]) {
        for point in &mut self.points {
            let out = f([
                f64::from(point[0]),
                f64::from(point[1]),
                f64::from(point[2]),
            ]);
            *point = [out[0] as f32, out[1] as f32, out[2] as f32];
        }
    }

    fn voxel_sizes_f64(&self) -> [f64; 3] {
        self.space_attributes.voxel_sizes().map(f64::from)
    }

    pub fn to_vox(&mut self) -> Result<()> {
        match self.space {
            Space::Vox => {}
            Space::Voxmm => {
                let sizes = self.voxel_sizes_f64();
                self.transform(|p| [p[0] / sizes[0], p[1] / sizes[1], p[2] / sizes[2]]);
            }
            Space::Rasmm => {
                let inverse = self.space_attributes.inverse_affine()?;
                self.transform(|p| apply_affine(&inverse, p));
            }
        }
        self.space = Space::Vox;
        Ok(())
    }

    pub fn to_voxmm(&mut self) -> Result<()> {
        if self.space == Space::Voxmm {
            return Ok(());
        }
        self.to_vox()?;
        let sizes = self.voxel_sizes_f64();
        self.transform(|p| [p[0] * sizes[0], p[1] * sizes[1], p[2] * sizes[2]]);
        self.space = Space::Voxmm;
        Ok(())
    }

    pub fn to_rasmm(&mut self) -> Result<()> {
        if self.space == Space::Rasmm {
            return Ok(());
        }
        self.to_vox()?;
        let affine = self.space_attributes.affine_f64();
        self.transform(|p| apply_affine(&affine, p));
        self.space = Space::Rasmm;
        Ok(())
    }

    pub fn to_space(&mut self, space: Space) -> Result<()> {
        match space {
            Space::Rasmm => self.to_rasmm(),
            Space::Voxmm => self.to_voxmm(),
            Space::Vox => self.to_vox(),
        }
    }

    /// Shift by `delta` voxels along every axis, in whatever space the points are in.
    fn shift_voxels(&mut self, delta: f64) -> Result<()> {
        let space = self.space;
        self.to_vox()?;
        self.transform(|p| [p[0] + delta, p[1] + delta, p[2] + delta]);
        self.to_space(space)
    }

    pub fn to_corner(&mut self) -> Result<()> {
        if self.origin == Origin::Center {
            self.shift_voxels(0.5)?;
            self.origin = Origin::Corner;
        }
        Ok(())
    }

    pub fn to_center(&mut self) -> Result<()> {
        if self.origin == Origin::Corner {
            self.shift_voxels(-0.5)?;
            self.origin = Origin::Center;
        }
        Ok(())
    }

    pub fn to_origin(&mut self, origin: Origin) -> Result<()> {
        match origin {
            Origin::Center => self.to_center(),
            Origin::Corner => self.to_corner(),
        }
    }
}

impl SpatialReference for Tractogram {
    fn space_attributes(&self) -> Result<SpaceAttributes> {
        Ok(self.space_attributes)
    }
}

impl TrxFile {
    /// Copy `tractogram` into a new container in a temporary directory.
    ///
    /// The tractogram is moved to RAS+mm/center for the copy and restored to its original
    /// space and origin before returning, whether or not the copy succeeded.
    pub fn from_tractogram(tractogram: &mut Tractogram, options: &TrxOptions) -> Result<Self> {
        Self::from_tractogram_in(tractogram, options, Backend::temporary()?)
    }

    pub fn from_tractogram_in(
        tractogram: &mut Tractogram,
        options: &TrxOptions,
        backend: Backend,
    ) -> Result<Self> {
        let (space, origin) = (tractogram.space(), tractogram.origin());
        let copied = tractogram
            .to_rasmm()
            .and_then(|()| tractogram.to_center())
            .and_then(|()| Self::copy_tractogram(tractogram, options, backend));
        let restored = tractogram
            .to_space(space)
            .and_then(|()| tractogram.to_origin(origin));
        let mut trx = copied?;
        if let Err(err) = restored {
            trx.close()?;
            return Err(err);
        }
        Ok(trx)
    }

    fn copy_tractogram(
        tractogram: &Tractogram,
        options: &TrxOptions,
        backend: Backend,
    ) -> Result<Self> {
        let dtype = options.positions_dtype;
        if !dtype.is_float() {
            tracing::warn!(
                target: "trx::tractogram",
                %dtype,
                "casting positions to a non-floating point dtype"
            );
        }
        let mut trx = Self::from_reference(tractogram, backend, options.clone())?;
        let flat: Vec<f64> = tractogram
            .points
            .iter()
            .flat_map(|p| p.iter().map(|&v| f64::from(v)))
            .collect();
        let positions = NdArray::from_f64_as(dtype, &flat, &[tractogram.points.len(), 3])?;
        let offsets = NdArray::from_slice(tractogram.index.offsets());

        let point_rows = trx.chunk_rows(ChunkClass::Point);
        let streamline_rows = trx.chunk_rows(ChunkClass::Streamline);
        let store = trx.store_mut()?;
        store.append_rows(POSITIONS, &positions)?;
        store.append_rows(OFFSETS, &offsets)?;
        for (key, data) in &tractogram.data_per_point {
            store.create_array_with(&point_path(key), data, point_rows)?;
        }
        for (key, data) in &tractogram.data_per_streamline {
            store.create_array_with(&streamline_path(key), data, streamline_rows)?;
        }
        trx.set_nb_streamlines(tractogram.index.len() as u64)?;
        trx.set_nb_points(tractogram.points.len() as u64)?;
        Ok(trx)
    }

    /// Whole-container copy as a RAS+mm, center-origin tractogram.
    pub fn to_tractogram(&self) -> Result<Tractogram> {
        let mut tractogram = Tractogram::new(
            self.space_attributes()?,
            Space::Rasmm,
            Origin::Center,
            self.streamlines()?,
        )?;
        for (key, data) in self.data_per_point_raw()? {
            tractogram = tractogram.with_data_per_point(&key, data)?;
        }
        for (key, data) in self.data_per_streamline()? {
            tractogram = tractogram.with_data_per_streamline(&key, data)?;
        }
        Ok(tractogram)
    }

    fn data_per_point_raw(&self) -> Result<Vec<(String, NdArray)>> {
        let store = self.store()?;
        self.data_per_point_keys()?
            .into_iter()
            .map(|key| {
                let data = store.read_array(&point_path(&key))?;
                Ok((key, data))
            })
            .collect()
    }
}
