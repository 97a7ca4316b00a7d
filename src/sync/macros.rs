/// Generates a bounds-checked read method for a single primitive type.
macro_rules! impl_read_primitive {
    // Single byte types - no endianness suffix
    (u8) => {
        /// Reads a `u8` at the given offset.
        #[inline]
        pub fn read_u8_at(&self, offset: usize) -> Result<u8, Error> {
            self.bytes.get(offset).copied().ok_or(Error::OutOfBounds)
        }
    };
    (i8) => {
        /// Reads an `i8` at the given offset.
        #[inline]
        pub fn read_i8_at(&self, offset: usize) -> Result<i8, Error> {
            self.read_u8_at(offset).map(|b| b as i8)
        }
    };
    // Multi-byte types - le/be variants
    ($type:ty, $size:literal) => {
        paste::paste! {
            #[doc = "Reads a little-endian `" $type "` at the given offset."]
            #[inline]
            pub fn [<read_ $type _le_at>](&self, offset: usize) -> Result<$type, Error> {
                let mut raw = [0u8; $size];
                self.read(offset, &mut raw)?;
                Ok(<$type>::from_le_bytes(raw))
            }

            #[doc = "Reads a big-endian `" $type "` at the given offset."]
            #[inline]
            pub fn [<read_ $type _be_at>](&self, offset: usize) -> Result<$type, Error> {
                let mut raw = [0u8; $size];
                self.read(offset, &mut raw)?;
                Ok(<$type>::from_be_bytes(raw))
            }
        }
    };
}

/// Generates read methods for all standard primitive types.
macro_rules! impl_read_primitives {
    () => {
        impl_read_primitive!(u8);
        impl_read_primitive!(i8);
        impl_read_primitive!(u16, 2);
        impl_read_primitive!(i16, 2);
        impl_read_primitive!(u32, 4);
        impl_read_primitive!(i32, 4);
    };
}

/// Generates a bounds-checked write method for a single primitive type.
macro_rules! impl_write_primitive {
    // Single byte types - no endianness suffix
    (u8) => {
        /// Writes a `u8` at the given offset.
        #[inline]
        pub fn write_u8_at(&mut self, offset: usize, value: u8) -> Result<(), Error> {
            self.write(offset, &[value])
        }
    };
    (i8) => {
        /// Writes an `i8` at the given offset.
        #[inline]
        pub fn write_i8_at(&mut self, offset: usize, value: i8) -> Result<(), Error> {
            self.write(offset, &[value as u8])
        }
    };
    // Multi-byte types - le/be variants
    ($type:ty, $size:literal) => {
        paste::paste! {
            #[doc = "Writes a little-endian `" $type "` at the given offset."]
            #[inline]
            pub fn [<write_ $type _le_at>](&mut self, offset: usize, value: $type) -> Result<(), Error> {
                self.write(offset, &value.to_le_bytes())
            }

            #[doc = "Writes a big-endian `" $type "` at the given offset."]
            #[inline]
            pub fn [<write_ $type _be_at>](&mut self, offset: usize, value: $type) -> Result<(), Error> {
                self.write(offset, &value.to_be_bytes())
            }
        }
    };
}

/// Generates write methods for all standard primitive types.
macro_rules! impl_write_primitives {
    () => {
        impl_write_primitive!(u8);
        impl_write_primitive!(i8);
        impl_write_primitive!(u16, 2);
        impl_write_primitive!(i16, 2);
        impl_write_primitive!(u32, 4);
        impl_write_primitive!(i32, 4);
    };
}
