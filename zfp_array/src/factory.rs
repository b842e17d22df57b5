use std::collections::HashMap;

use log::debug;
use zfp_core::{Header, Mode, Result, ScalarType, Shape, ZfpError, HEADER_BYTES};

use crate::array::{ArrayConfig, ArrayScalar, CompressedArray};
use crate::store::{BufferView, Source};

/// Type-erased compressed array, as returned by the [`Factory`].
pub trait Array {
    fn dims(&self) -> usize;
    fn scalar_type(&self) -> ScalarType;
    fn shape(&self) -> &Shape;
    fn mode(&self) -> Mode;
    fn header(&self) -> Result<Header>;
    fn flush(&mut self) -> Result<()>;
    fn compressed_data(&mut self) -> Result<&[u8]>;
    /// Reads one value, widened to `f64`.
    fn get_f64(&mut self, index: &[usize]) -> Result<f64>;
    /// Writes one value, narrowed to the array's scalar type.
    fn set_f64(&mut self, index: &[usize], value: f64) -> Result<()>;
}

fn fixed_index<const D: usize>(index: &[usize], shape: &Shape) -> Result<[usize; D]> {
    <[usize; D]>::try_from(index).map_err(|_| ZfpError::IndexOutOfBounds {
        index: index.to_vec(),
        shape: shape.extents().to_vec(),
    })
}

impl<T: ArrayScalar, const D: usize> Array for CompressedArray<'_, T, D> {
    fn dims(&self) -> usize {
        D
    }

    fn scalar_type(&self) -> ScalarType {
        T::TYPE
    }

    fn shape(&self) -> &Shape {
        CompressedArray::shape(self)
    }

    fn mode(&self) -> Mode {
        CompressedArray::mode(self)
    }

    fn header(&self) -> Result<Header> {
        CompressedArray::header(self)
    }

    fn flush(&mut self) -> Result<()> {
        CompressedArray::flush(self)
    }

    fn compressed_data(&mut self) -> Result<&[u8]> {
        CompressedArray::compressed_data(self)
    }

    fn get_f64(&mut self, index: &[usize]) -> Result<f64> {
        let index = fixed_index::<D>(index, CompressedArray::shape(self))?;
        Ok(self.get_at(index)?.to_f64())
    }

    fn set_f64(&mut self, index: &[usize], value: f64) -> Result<()> {
        let index = fixed_index::<D>(index, CompressedArray::shape(self))?;
        self.set_at(index, T::from_f64(value))
    }
}

/// Builds one registered array type from a header.
pub type Constructor = for<'a> fn(&Header, Source<'a>, &ArrayConfig) -> Result<Box<dyn Array + 'a>>;

fn construct_array<'a, T: ArrayScalar, const D: usize>(
    header: &Header,
    source: Source<'a>,
    config: &ArrayConfig,
) -> Result<Box<dyn Array + 'a>> {
    Ok(Box::new(CompressedArray::<'a, T, D>::from_header(header, source, *config)?))
}

/// Registry of the array types a deployment supports.
///
/// Dimensionalities must be registered before headers of that
/// dimensionality can be turned into arrays; [`Factory::default`] registers
/// everything.
///
/// ```
/// use zfp_array::Factory;
///
/// let factory = Factory::new().with_array2().with_array3();
/// assert!(!factory.is_registered(1, zfp_core::ScalarType::Double));
/// ```
pub struct Factory {
    constructors: HashMap<(usize, ScalarType), Constructor>,
    config: ArrayConfig,
}

impl Factory {
    /// Factory with nothing registered.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            config: ArrayConfig::default(),
        }
    }

    /// Configuration applied to every array this factory builds.
    pub fn with_config(mut self, config: ArrayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn register<T: ArrayScalar, const D: usize>(&mut self) -> &mut Self {
        self.constructors
            .insert((D, T::TYPE), construct_array::<T, D> as Constructor);
        self
    }

    pub fn with_array1(mut self) -> Self {
        self.register::<f32, 1>().register::<f64, 1>();
        self
    }

    pub fn with_array2(mut self) -> Self {
        self.register::<f32, 2>().register::<f64, 2>();
        self
    }

    pub fn with_array3(mut self) -> Self {
        self.register::<f32, 3>().register::<f64, 3>();
        self
    }

    pub fn is_registered(&self, dims: usize, scalar: ScalarType) -> bool {
        self.constructors.contains_key(&(dims, scalar))
    }

    fn lookup(&self, header: &Header) -> Result<Constructor> {
        let dims = header.dims();
        if !(1..=3).contains(&dims) {
            return Err(ZfpError::UnsupportedDimensionality);
        }
        self.constructors
            .get(&(dims, header.scalar_type()))
            .copied()
            .ok_or(ZfpError::DimensionalityNotRegistered { dims })
    }

    /// All-zero array with its own buffer.
    pub fn construct(&self, header: &Header) -> Result<Box<dyn Array>> {
        let construct = self.lookup(header)?;
        construct(header, Source::Empty, &self.config)
    }

    /// Array over a caller buffer holding the compressed blocks (without
    /// header). The buffer stays borrowed for the array's lifetime.
    pub fn construct_with<'a>(&self, header: &Header, view: BufferView<'a>) -> Result<Box<dyn Array + 'a>> {
        let construct = self.lookup(header)?;
        construct(header, Source::View(view), &self.config)
    }

    /// Array from a serialized header followed by compressed blocks, as
    /// produced by `CompressedArray::to_bytes`. Header errors surface as-is.
    pub fn construct_from_bytes(&self, bytes: &[u8]) -> Result<Box<dyn Array>> {
        let header = Header::from_bytes(bytes)?;
        let construct = self.lookup(&header)?;
        debug!(
            "constructing {}D {} array from {} bytes",
            header.dims(),
            header.scalar_type(),
            bytes.len()
        );
        let data = bytes[HEADER_BYTES..].to_vec();
        construct(&header, Source::Bytes(data), &self.config)
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new().with_array1().with_array2().with_array3()
    }
}
