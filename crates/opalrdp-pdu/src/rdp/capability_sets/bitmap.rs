use bitflags::bitflags;
use opalrdp_core::{
    ensure_fixed_part_size, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct BitmapDrawingFlags: u8 {
        const ALLOW_DYNAMIC_COLOR_FIDELITY = 0x02;
        const ALLOW_COLOR_SUBSAMPLING = 0x04;
        const ALLOW_SKIP_ALPHA = 0x08;
    }
}

/// TS_BITMAP_CAPABILITYSET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub pref_bits_per_pix: u16,
    pub desktop_width: u16,
    pub desktop_height: u16,
    pub desktop_resize_flag: bool,
    pub drawing_flags: BitmapDrawingFlags,
}

impl Bitmap {
    const NAME: &'static str = "Bitmap";

    const FIXED_PART_SIZE: usize = 2 /* prefBitsPerPix */ + 2 * 3 /* receiveNBitsPerPixel */ + 2 /* width */
        + 2 /* height */ + 2 /* pad */ + 2 /* desktopResizeFlag */ + 2 /* bitmapCompressionFlag */
        + 1 /* highColorFlags */ + 1 /* drawingFlags */ + 2 /* multipleRectangleSupport */ + 2 /* pad */;
}

impl Encode for Bitmap {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.pref_bits_per_pix);
        dst.write_u16(1); // receive1BitPerPixel
        dst.write_u16(1); // receive4BitsPerPixel
        dst.write_u16(1); // receive8BitsPerPixel
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        write_padding!(dst, 2);
        dst.write_u16(u16::from(self.desktop_resize_flag));
        dst.write_u16(1); // bitmapCompressionFlag, must be 1
        dst.write_u8(0); // highColorFlags
        dst.write_u8(self.drawing_flags.bits());
        dst.write_u16(1); // multipleRectangleSupport
        write_padding!(dst, 2);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Bitmap {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let pref_bits_per_pix = src.read_u16();
        let _receive_1_bit = src.read_u16();
        let _receive_4_bits = src.read_u16();
        let _receive_8_bits = src.read_u16();
        let desktop_width = src.read_u16();
        let desktop_height = src.read_u16();
        read_padding!(src, 2);
        let desktop_resize_flag = src.read_u16() != 0;
        let _bitmap_compression_flag = src.read_u16();
        let _high_color_flags = src.read_u8();
        let drawing_flags = BitmapDrawingFlags::from_bits_truncate(src.read_u8());
        let _multiple_rectangle_support = src.read_u16();
        read_padding!(src, 2);

        Ok(Self {
            pref_bits_per_pix,
            desktop_width,
            desktop_height,
            desktop_resize_flag,
            drawing_flags,
        })
    }
}
