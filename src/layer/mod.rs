use anyhow::{bail, Result};
use geo::MultiPolygon;

use crate::crs::{self, Crs};
use crate::types::{AttrValue, Schema};

/// An ordered collection of polygon features sharing one CRS and one
/// schema. Geometry and attribute rows are stored column-for-column
/// parallel; feature ids are positional indices.
#[derive(Debug, Clone)]
pub struct Layer {
    crs: Crs,
    schema: Schema,
    geoms: Vec<MultiPolygon<f64>>,
    rows: Vec<Vec<AttrValue>>,
}

impl Layer {
    pub fn new(crs: Crs, schema: Schema) -> Self {
        Self { crs, schema, geoms: Vec::new(), rows: Vec::new() }
    }

    /// Append one feature. The row must match the schema in arity and in
    /// per-field kind (nulls are accepted anywhere).
    pub fn push(&mut self, geom: MultiPolygon<f64>, row: Vec<AttrValue>) -> Result<()> {
        if row.len() != self.schema.len() {
            bail!(
                "row arity {} does not match schema arity {}",
                row.len(),
                self.schema.len()
            );
        }
        for (field, value) in self.schema.fields().iter().zip(&row) {
            if !field.accepts(value) {
                bail!("value {value} is not a valid {:?} for field `{}`", field.kind, field.name);
            }
        }
        self.geoms.push(geom);
        self.rows.push(row);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.geoms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.geoms.is_empty()
    }

    #[inline]
    pub fn crs(&self) -> Crs {
        self.crs
    }

    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    pub fn geoms(&self) -> &[MultiPolygon<f64>] {
        &self.geoms
    }

    #[inline]
    pub fn geom(&self, idx: usize) -> &MultiPolygon<f64> {
        &self.geoms[idx]
    }

    #[inline]
    pub fn row(&self, idx: usize) -> &[AttrValue] {
        &self.rows[idx]
    }

    /// Attribute cell at (feature, column).
    #[inline]
    pub fn value(&self, idx: usize, col: usize) -> &AttrValue {
        &self.rows[idx][col]
    }

    /// Copy of this layer with every geometry reprojected into `to`.
    /// Attributes and ordering are untouched.
    pub fn reproject(&self, to: Crs) -> Result<Layer> {
        let geoms = crs::reproject(&self.geoms, self.crs, to)?;
        Ok(Layer { crs: to, schema: self.schema.clone(), geoms, rows: self.rows.clone() })
    }
}
