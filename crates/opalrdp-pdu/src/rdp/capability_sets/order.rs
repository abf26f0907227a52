use bitflags::bitflags;
use opalrdp_core::{
    ensure_fixed_part_size, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

const TERMINAL_DESCRIPTOR_SIZE: usize = 16;
const ORDER_SUPPORT_SIZE: usize = 32;
const DESKTOP_SAVE_SIZE: u32 = 480 * 480;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct OrderFlags: u16 {
        const NEGOTIATE_ORDER_SUPPORT = 0x0002;
        const ZERO_BOUNDS_DELTAS_SUPPORT = 0x0008;
        const COLOR_INDEX_SUPPORT = 0x0020;
        const SOLID_PATTERN_BRUSH_ONLY = 0x0040;
        const ORDER_FLAGS_EXTRA_FLAGS = 0x0080;
    }
}

/// Indices into the `orderSupport` array.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(usize)]
pub enum OrderSupportIndex {
    DstBlt = 0x00,
    PatBlt = 0x01,
    ScrBlt = 0x02,
    MemBlt = 0x03,
    Mem3Blt = 0x04,
    LineTo = 0x08,
    SaveBitmap = 0x0B,
    MultiDstBlt = 0x0F,
    MultiPatBlt = 0x10,
    MultiScrBlt = 0x11,
    MultiOpaqueRect = 0x12,
    Polyline = 0x16,
    GlyphIndex = 0x1B,
}

/// TS_ORDER_CAPABILITYSET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_flags: OrderFlags,
    pub order_support: [u8; ORDER_SUPPORT_SIZE],
}

impl Order {
    const NAME: &'static str = "Order";

    const FIXED_PART_SIZE: usize = TERMINAL_DESCRIPTOR_SIZE + 4 /* pad */ + 2 /* desktopSaveXGranularity */
        + 2 /* desktopSaveYGranularity */ + 2 /* pad */ + 2 /* maximumOrderLevel */ + 2 /* numberFonts */
        + 2 /* orderFlags */ + ORDER_SUPPORT_SIZE + 2 /* textFlags */ + 2 /* orderSupportExFlags */
        + 4 /* pad */ + 4 /* desktopSaveSize */ + 2 /* pad */ + 2 /* pad */ + 2 /* textANSICodePage */ + 2 /* pad */;

    pub fn new(order_flags: OrderFlags) -> Self {
        Self {
            order_flags,
            order_support: [0; ORDER_SUPPORT_SIZE],
        }
    }
}

impl Encode for Order {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        write_padding!(dst, TERMINAL_DESCRIPTOR_SIZE); // terminalDescriptor
        write_padding!(dst, 4);
        dst.write_u16(1); // desktopSaveXGranularity
        dst.write_u16(20); // desktopSaveYGranularity
        write_padding!(dst, 2);
        dst.write_u16(1); // maximumOrderLevel: ORD_LEVEL_1_ORDERS
        dst.write_u16(0); // numberFonts
        dst.write_u16(self.order_flags.bits());
        dst.write_slice(&self.order_support);
        dst.write_u16(0); // textFlags
        dst.write_u16(0); // orderSupportExFlags
        write_padding!(dst, 4);
        dst.write_u32(DESKTOP_SAVE_SIZE);
        write_padding!(dst, 4);
        dst.write_u16(0); // textANSICodePage
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

impl<'de> Decode<'de> for Order {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        read_padding!(src, TERMINAL_DESCRIPTOR_SIZE + 4);
        let _desktop_save_x_granularity = src.read_u16();
        let _desktop_save_y_granularity = src.read_u16();
        read_padding!(src, 2);
        let _maximum_order_level = src.read_u16();
        let _number_fonts = src.read_u16();
        let order_flags = OrderFlags::from_bits_truncate(src.read_u16());
        let order_support = src.read_array::<ORDER_SUPPORT_SIZE>();
        let _text_flags = src.read_u16();
        let _order_support_ex_flags = src.read_u16();
        read_padding!(src, 4);
        let _desktop_save_size = src.read_u32();
        read_padding!(src, 4);
        let _text_ansi_code_page = src.read_u16();
        read_padding!(src, 2);

        Ok(Self {
            order_flags,
            order_support,
        })
    }
}
