#[allow(non_camel_case_types)]
pub type DwarfTag = u64;
#[allow(non_camel_case_types)]
pub type DwarfAttr = u64;
#[allow(non_camel_case_types)]
pub type DwarfForm = u64;

pub const DW_TAG_COMPILE_UNIT: DwarfTag = 0x11;
pub const DW_TAG_VARIABLE: DwarfTag = 0x34;
pub const DW_TAG_SUBPROGRAM: DwarfTag = 0x2e;
pub const DW_TAG_INLINED_SUBROUTINE: DwarfTag = 0x1d;

// DW_AT_* constants (subset)
pub const DW_AT_SIBLING: DwarfAttr = 0x01;
pub const DW_AT_LOCATION: DwarfAttr = 0x02;
pub const DW_AT_NAME: DwarfAttr = 0x03;
pub const DW_AT_STMT_LIST: DwarfAttr = 0x10;
pub const DW_AT_LOW_PC: DwarfAttr = 0x11;
pub const DW_AT_HIGH_PC: DwarfAttr = 0x12;
pub const DW_AT_COMP_DIR: DwarfAttr = 0x1b;
pub const DW_AT_DECL_COLUMN: DwarfAttr = 0x39;
pub const DW_AT_DECL_FILE: DwarfAttr = 0x3a;
pub const DW_AT_DECL_LINE: DwarfAttr = 0x3b;
pub const DW_AT_EXTERNAL: DwarfAttr = 0x3f;
pub const DW_AT_RANGES: DwarfAttr = 0x55;
pub const DW_AT_LINKAGE_NAME: DwarfAttr = 0x6e;

// DW_FORM_* constants
pub const DW_FORM_ADDR: DwarfForm = 0x01;
pub const DW_FORM_BLOCK2: DwarfForm = 0x03;
pub const DW_FORM_BLOCK4: DwarfForm = 0x04;
pub const DW_FORM_DATA2: DwarfForm = 0x05;
pub const DW_FORM_DATA4: DwarfForm = 0x06;
pub const DW_FORM_DATA8: DwarfForm = 0x07;
pub const DW_FORM_STRING: DwarfForm = 0x08;
pub const DW_FORM_BLOCK: DwarfForm = 0x09;
pub const DW_FORM_BLOCK1: DwarfForm = 0x0a;
pub const DW_FORM_DATA1: DwarfForm = 0x0b;
pub const DW_FORM_FLAG: DwarfForm = 0x0c;
pub const DW_FORM_SDATA: DwarfForm = 0x0d;
pub const DW_FORM_STRP: DwarfForm = 0x0e;
pub const DW_FORM_UDATA: DwarfForm = 0x0f;
pub const DW_FORM_REF_ADDR: DwarfForm = 0x10;
pub const DW_FORM_REF1: DwarfForm = 0x11;
pub const DW_FORM_REF2: DwarfForm = 0x12;
pub const DW_FORM_REF4: DwarfForm = 0x13;
pub const DW_FORM_REF8: DwarfForm = 0x14;
pub const DW_FORM_REF_UDATA: DwarfForm = 0x15;
pub const DW_FORM_INDIRECT: DwarfForm = 0x16;
pub const DW_FORM_SEC_OFFSET: DwarfForm = 0x17;
pub const DW_FORM_EXPRLOC: DwarfForm = 0x18;
pub const DW_FORM_FLAG_PRESENT: DwarfForm = 0x19;
pub const DW_FORM_STRX: DwarfForm = 0x1a;
pub const DW_FORM_ADDRX: DwarfForm = 0x1b;
pub const DW_FORM_REF_SUP4: DwarfForm = 0x1c;
pub const DW_FORM_STRP_SUP: DwarfForm = 0x1d;
pub const DW_FORM_DATA16: DwarfForm = 0x1e;
pub const DW_FORM_LINE_STRP: DwarfForm = 0x1f;
pub const DW_FORM_REF_SIG8: DwarfForm = 0x20;
pub const DW_FORM_IMPLICIT_CONST: DwarfForm = 0x21;
pub const DW_FORM_LOCLISTX: DwarfForm = 0x22;
pub const DW_FORM_RNGLISTX: DwarfForm = 0x23;
pub const DW_FORM_REF_SUP8: DwarfForm = 0x24;
pub const DW_FORM_STRX1: DwarfForm = 0x25;
pub const DW_FORM_STRX2: DwarfForm = 0x26;
pub const DW_FORM_STRX3: DwarfForm = 0x27;
pub const DW_FORM_STRX4: DwarfForm = 0x28;
pub const DW_FORM_ADDRX1: DwarfForm = 0x29;
pub const DW_FORM_ADDRX2: DwarfForm = 0x2a;
pub const DW_FORM_ADDRX3: DwarfForm = 0x2b;
pub const DW_FORM_ADDRX4: DwarfForm = 0x2c;

/// Attribute encoding, decoded once from the raw abbreviation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    Addr,
    Block1,
    Block2,
    Block4,
    Block,
    Data1,
    Data2,
    Data4,
    Data8,
    Data16,
    Sdata,
    Udata,
    ImplicitConst,
    String,
    Strp,
    LineStrp,
    StrpSup,
    Strx,
    Strx1,
    Strx2,
    Strx3,
    Strx4,
    Addrx,
    Addrx1,
    Addrx2,
    Addrx3,
    Addrx4,
    Flag,
    FlagPresent,
    Ref1,
    Ref2,
    Ref4,
    Ref8,
    RefUdata,
    RefAddr,
    RefSig8,
    RefSup4,
    RefSup8,
    SecOffset,
    Exprloc,
    Loclistx,
    Rnglistx,
    Indirect,
    Unknown(u64),
}

impl Form {
    pub fn from_raw(raw: DwarfForm) -> Self {
        match raw {
            DW_FORM_ADDR => Form::Addr,
            DW_FORM_BLOCK2 => Form::Block2,
            DW_FORM_BLOCK4 => Form::Block4,
            DW_FORM_DATA2 => Form::Data2,
            DW_FORM_DATA4 => Form::Data4,
            DW_FORM_DATA8 => Form::Data8,
            DW_FORM_STRING => Form::String,
            DW_FORM_BLOCK => Form::Block,
            DW_FORM_BLOCK1 => Form::Block1,
            DW_FORM_DATA1 => Form::Data1,
            DW_FORM_FLAG => Form::Flag,
            DW_FORM_SDATA => Form::Sdata,
            DW_FORM_STRP => Form::Strp,
            DW_FORM_UDATA => Form::Udata,
            DW_FORM_REF_ADDR => Form::RefAddr,
            DW_FORM_REF1 => Form::Ref1,
            DW_FORM_REF2 => Form::Ref2,
            DW_FORM_REF4 => Form::Ref4,
            DW_FORM_REF8 => Form::Ref8,
            DW_FORM_REF_UDATA => Form::RefUdata,
            DW_FORM_INDIRECT => Form::Indirect,
            DW_FORM_SEC_OFFSET => Form::SecOffset,
            DW_FORM_EXPRLOC => Form::Exprloc,
            DW_FORM_FLAG_PRESENT => Form::FlagPresent,
            DW_FORM_STRX => Form::Strx,
            DW_FORM_ADDRX => Form::Addrx,
            DW_FORM_REF_SUP4 => Form::RefSup4,
            DW_FORM_STRP_SUP => Form::StrpSup,
            DW_FORM_DATA16 => Form::Data16,
            DW_FORM_LINE_STRP => Form::LineStrp,
            DW_FORM_REF_SIG8 => Form::RefSig8,
            DW_FORM_IMPLICIT_CONST => Form::ImplicitConst,
            DW_FORM_LOCLISTX => Form::Loclistx,
            DW_FORM_RNGLISTX => Form::Rnglistx,
            DW_FORM_REF_SUP8 => Form::RefSup8,
            DW_FORM_STRX1 => Form::Strx1,
            DW_FORM_STRX2 => Form::Strx2,
            DW_FORM_STRX3 => Form::Strx3,
            DW_FORM_STRX4 => Form::Strx4,
            DW_FORM_ADDRX1 => Form::Addrx1,
            DW_FORM_ADDRX2 => Form::Addrx2,
            DW_FORM_ADDRX3 => Form::Addrx3,
            DW_FORM_ADDRX4 => Form::Addrx4,
            other => Form::Unknown(other),
        }
    }

    /// The interpretation an attribute of this form supports.
    pub fn value_kind(self) -> ValueKind {
        match self {
            Form::Addr | Form::Addrx | Form::Addrx1 | Form::Addrx2 | Form::Addrx3 | Form::Addrx4 => {
                ValueKind::Address
            }
            Form::String
            | Form::Strp
            | Form::LineStrp
            | Form::StrpSup
            | Form::Strx
            | Form::Strx1
            | Form::Strx2
            | Form::Strx3
            | Form::Strx4 => ValueKind::String,
            Form::Data1
            | Form::Data2
            | Form::Data4
            | Form::Data8
            | Form::Data16
            | Form::Sdata
            | Form::Udata
            | Form::ImplicitConst => ValueKind::Constant,
            Form::Ref1
            | Form::Ref2
            | Form::Ref4
            | Form::Ref8
            | Form::RefUdata
            | Form::RefAddr
            | Form::RefSig8
            | Form::RefSup4
            | Form::RefSup8 => ValueKind::Reference,
            Form::Block1 | Form::Block2 | Form::Block4 | Form::Block => ValueKind::Block,
            Form::Exprloc => ValueKind::Expression,
            Form::Flag | Form::FlagPresent => ValueKind::Flag,
            Form::SecOffset | Form::Loclistx | Form::Rnglistx => ValueKind::SectionOffset,
            Form::Indirect | Form::Unknown(_) => ValueKind::Unresolved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Address,
    String,
    Constant,
    Reference,
    Block,
    Expression,
    Flag,
    SectionOffset,
    /// Only known once an `indirect` form has been followed.
    Unresolved,
}

// DW_OP_* constants
pub const DW_OP_ADDR: u8 = 0x03;
pub const DW_OP_DEREF: u8 = 0x06;
pub const DW_OP_CONST1U: u8 = 0x08;
pub const DW_OP_CONST1S: u8 = 0x09;
pub const DW_OP_CONST2U: u8 = 0x0a;
pub const DW_OP_CONST2S: u8 = 0x0b;
pub const DW_OP_CONST4U: u8 = 0x0c;
pub const DW_OP_CONST4S: u8 = 0x0d;
pub const DW_OP_CONST8U: u8 = 0x0e;
pub const DW_OP_CONST8S: u8 = 0x0f;
pub const DW_OP_CONSTU: u8 = 0x10;
pub const DW_OP_CONSTS: u8 = 0x11;
pub const DW_OP_DUP: u8 = 0x12;
pub const DW_OP_DROP: u8 = 0x13;
pub const DW_OP_OVER: u8 = 0x14;
pub const DW_OP_PICK: u8 = 0x15;
pub const DW_OP_SWAP: u8 = 0x16;
pub const DW_OP_ROT: u8 = 0x17;
pub const DW_OP_XDEREF: u8 = 0x18;
pub const DW_OP_ABS: u8 = 0x19;
pub const DW_OP_AND: u8 = 0x1a;
pub const DW_OP_DIV: u8 = 0x1b;
pub const DW_OP_MINUS: u8 = 0x1c;
pub const DW_OP_MOD: u8 = 0x1d;
pub const DW_OP_MUL: u8 = 0x1e;
pub const DW_OP_NEG: u8 = 0x1f;
pub const DW_OP_NOT: u8 = 0x20;
pub const DW_OP_OR: u8 = 0x21;
pub const DW_OP_PLUS: u8 = 0x22;
pub const DW_OP_PLUS_UCONST: u8 = 0x23;
pub const DW_OP_SHL: u8 = 0x24;
pub const DW_OP_SHR: u8 = 0x25;
pub const DW_OP_SHRA: u8 = 0x26;
pub const DW_OP_XOR: u8 = 0x27;
pub const DW_OP_BRA: u8 = 0x28;
pub const DW_OP_EQ: u8 = 0x29;
pub const DW_OP_GE: u8 = 0x2a;
pub const DW_OP_GT: u8 = 0x2b;
pub const DW_OP_LE: u8 = 0x2c;
pub const DW_OP_LT: u8 = 0x2d;
pub const DW_OP_NE: u8 = 0x2e;
pub const DW_OP_SKIP: u8 = 0x2f;
pub const DW_OP_LIT0: u8 = 0x30;
pub const DW_OP_LIT31: u8 = 0x4f;
pub const DW_OP_REG0: u8 = 0x50;
pub const DW_OP_REG31: u8 = 0x6f;
pub const DW_OP_BREG0: u8 = 0x70;
pub const DW_OP_BREG31: u8 = 0x8f;
pub const DW_OP_REGX: u8 = 0x90;
pub const DW_OP_FBREG: u8 = 0x91;
pub const DW_OP_BREGX: u8 = 0x92;
pub const DW_OP_PIECE: u8 = 0x93;
pub const DW_OP_DEREF_SIZE: u8 = 0x94;
pub const DW_OP_XDEREF_SIZE: u8 = 0x95;
pub const DW_OP_NOP: u8 = 0x96;
pub const DW_OP_PUSH_OBJECT_ADDRESS: u8 = 0x97;
pub const DW_OP_CALL2: u8 = 0x98;
pub const DW_OP_CALL4: u8 = 0x99;
pub const DW_OP_CALL_REF: u8 = 0x9a;
pub const DW_OP_FORM_TLS_ADDRESS: u8 = 0x9b;
pub const DW_OP_CALL_FRAME_CFA: u8 = 0x9c;
pub const DW_OP_BIT_PIECE: u8 = 0x9d;
pub const DW_OP_IMPLICIT_VALUE: u8 = 0x9e;
pub const DW_OP_STACK_VALUE: u8 = 0x9f;

// DW_UT_* unit types (DWARF 5)
pub const DW_UT_TYPE: u8 = 0x02;
pub const DW_UT_SKELETON: u8 = 0x04;
pub const DW_UT_SPLIT_COMPILE: u8 = 0x05;
pub const DW_UT_SPLIT_TYPE: u8 = 0x06;
