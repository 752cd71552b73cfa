mod common;

use anyhow::Result;
use dwarfstack::dwarf::constants::Form;
use dwarfstack::dwarf::{ByteOrder, Cursor, Format, Section};
use dwarfstack::error::DwarfError;

fn little(data: &[u8]) -> Cursor<'_> {
    Cursor::new(data, Section::whole(data, ByteOrder::Little))
}

#[test]
fn sub_section_32_bit_skips_four_byte_length() -> Result<()> {
    let mut data = 6u32.to_le_bytes().to_vec();
    data.extend([1, 2, 3, 4, 5, 6]);
    data.extend([0xaa, 0xbb]);

    let mut outer = little(&data);
    let unit = outer.sub_section()?;
    assert_eq!(unit.format, Format::Dwarf32);
    assert_eq!((unit.begin, unit.end), (0, 10));
    assert_eq!(outer.position(), 10);

    let mut inner = Cursor::new(&data, unit);
    inner.skip_initial_length()?;
    assert_eq!(inner.position(), 4);
    assert_eq!(inner.read_u8()?, 1);
    Ok(())
}

#[test]
fn sub_section_64_bit_skips_escape_and_length() -> Result<()> {
    let mut data = 0xffff_ffffu32.to_le_bytes().to_vec();
    data.extend(4u64.to_le_bytes());
    data.extend([9, 8, 7, 6]);

    let mut outer = little(&data);
    let unit = outer.sub_section()?;
    assert_eq!(unit.format, Format::Dwarf64);
    assert_eq!(unit.end, 16);

    let mut inner = Cursor::new(&data, unit);
    inner.skip_initial_length()?;
    assert_eq!(inner.position(), 12);
    assert_eq!(inner.read_u32()?, u32::from_le_bytes([9, 8, 7, 6]));
    Ok(())
}

#[test]
fn reserved_initial_length_is_rejected() {
    let data = 0xffff_fff5u32.to_le_bytes();
    let err = little(&data).sub_section().unwrap_err();
    assert_eq!(err, DwarfError::ReservedInitialLength(0xffff_fff5));
}

#[test]
fn sub_section_longer_than_data_is_truncated() {
    let mut data = 100u32.to_le_bytes().to_vec();
    data.extend([0; 8]);
    let err = little(&data).sub_section().unwrap_err();
    assert!(matches!(err, DwarfError::Truncated { .. }), "{err:?}");
}

#[test]
fn leb128_boundary_values() -> Result<()> {
    let unsigned = [0u64, 1, 127, 128, 255, 16_383, 16_384, 1 << 35, u64::MAX];
    for value in unsigned {
        let mut bytes = Vec::new();
        common::uleb(&mut bytes, value);
        let mut cursor = little(&bytes);
        assert_eq!(cursor.read_uleb128()?, value, "uleb {value}");
        assert!(cursor.is_empty());
    }

    let signed = [0i64, -1, 63, 64, -64, -65, 127, 128, -(1 << 40), i64::MIN, i64::MAX];
    for value in signed {
        let mut bytes = Vec::new();
        common::sleb(&mut bytes, value);
        let mut cursor = little(&bytes);
        assert_eq!(cursor.read_sleb128()?, value, "sleb {value}");
        assert!(cursor.is_empty());
    }
    Ok(())
}

#[test]
fn leb128_known_encodings() -> Result<()> {
    assert_eq!(little(&[0x7f]).read_uleb128()?, 127);
    assert_eq!(little(&[0x80, 0x01]).read_uleb128()?, 128);
    assert_eq!(little(&[0xe5, 0x8e, 0x26]).read_uleb128()?, 624_485);
    assert_eq!(little(&[0x80, 0x80, 0x80, 0x80, 0x10]).read_uleb128()?, 1 << 32);
    assert_eq!(little(&[0x7f]).read_sleb128()?, -1);
    assert_eq!(little(&[0x80, 0x7f]).read_sleb128()?, -128);
    Ok(())
}

#[test]
fn unterminated_leb128_is_truncated() {
    let err = little(&[0x80, 0x80]).read_uleb128().unwrap_err();
    assert!(matches!(err, DwarfError::Truncated { .. }), "{err:?}");
}

#[test]
fn fixed_width_reads_follow_byte_order() -> Result<()> {
    let data = [0x12, 0x34, 0x56, 0x78];
    assert_eq!(little(&data).read_u32()?, 0x7856_3412);
    let mut big = Cursor::new(&data, Section::whole(&data, ByteOrder::Big));
    assert_eq!(big.read_u16()?, 0x1234);
    assert_eq!(big.read_u16()?, 0x5678);
    Ok(())
}

#[test]
fn reads_never_cross_section_end() -> Result<()> {
    let data = [1, 2, 3, 4, 5, 6, 7, 8];
    let section = Section::new(0, 3, ByteOrder::Little);
    let mut cursor = Cursor::new(&data, section);
    assert_eq!(cursor.read_u16()?, 0x0201);
    let err = cursor.read_u16().unwrap_err();
    assert!(matches!(err, DwarfError::Truncated { .. }), "{err:?}");
    Ok(())
}

#[test]
fn strings_stop_at_terminator() -> Result<()> {
    let data = b"main\0helper\0tail";
    let mut cursor = little(data);
    assert_eq!(cursor.read_str()?, "main");
    assert_eq!(cursor.read_str()?, "helper");
    assert!(matches!(
        cursor.read_cstr(),
        Err(DwarfError::UnterminatedString(12))
    ));
    Ok(())
}

#[test]
fn skip_form_steps_over_encoded_values() -> Result<()> {
    let mut data = Vec::new();
    data.extend(b"name\0");
    common::uleb(&mut data, 300);
    data.extend([3, 0xa, 0xb, 0xc]); // block1
    data.extend(0x1234_5678u32.to_le_bytes()); // strp, 32-bit
    data.push(0x0f); // indirect -> udata
    common::uleb(&mut data, 1 << 20);
    data.push(0xee);

    let mut cursor = little(&data);
    cursor.skip_form(Form::String, 4)?;
    cursor.skip_form(Form::Udata, 4)?;
    cursor.skip_form(Form::Block1, 4)?;
    cursor.skip_form(Form::Strp, 4)?;
    cursor.skip_form(Form::FlagPresent, 4)?;
    cursor.skip_form(Form::Indirect, 4)?;
    assert_eq!(cursor.read_u8()?, 0xee);
    Ok(())
}

#[test]
fn ref_addr_width_depends_on_version() -> Result<()> {
    let data = [0u8; 12];
    let section = Section::whole(&data, ByteOrder::Little).with_address_size(8);

    let mut v2 = Cursor::new(&data, section);
    v2.skip_form(Form::RefAddr, 2)?;
    assert_eq!(v2.position(), 8);

    let mut v4 = Cursor::new(&data, section);
    v4.skip_form(Form::RefAddr, 4)?;
    assert_eq!(v4.position(), 4);
    Ok(())
}

#[test]
fn unknown_form_is_an_error() {
    let data = [0u8; 4];
    let err = little(&data).skip_form(Form::from_raw(0x7f), 4).unwrap_err();
    assert_eq!(err, DwarfError::UnknownForm(0x7f));
}
