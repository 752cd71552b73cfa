use crate::dwarf::constants::*;
use crate::dwarf::cursor::{ByteOrder, Cursor, Format, Section};
use crate::error::{DwarfError, Result};

/// Guards against backward branches that never terminate.
const MAX_OPERATIONS: usize = 100_000;

/// Slots seeded with zero below the caller's arguments.
const INITIAL_STACK_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionResult {
    /// The expression had no operations.
    Empty,
    Address(u64),
    Register(u64),
    /// Produced by `DW_OP_stack_value`.
    Literal(u64),
    Implicit(Vec<u8>),
}

/// A location expression borrowed from a debug section.
#[derive(Debug, Clone, Copy)]
pub struct Expression<'a> {
    bytes: &'a [u8],
    section: Section,
}

impl<'a> Expression<'a> {
    pub fn new(bytes: &'a [u8], byte_order: ByteOrder, address_size: u8, format: Format) -> Self {
        let mut section = Section::whole(bytes, byte_order).with_address_size(address_size);
        section.format = format;
        Self { bytes, section }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Runs the expression. `args` are pushed so that `args[0]` ends on top.
    pub fn evaluate(&self, args: &[u64]) -> Result<ExpressionResult> {
        if self.bytes.is_empty() {
            return Ok(ExpressionResult::Empty);
        }

        let mut machine = Machine {
            stack: vec![0; INITIAL_STACK_DEPTH],
        };
        machine.stack.extend(args.iter().rev());

        let mut cursor = Cursor::new(self.bytes, self.section);
        let mut executed = 0usize;

        while !cursor.is_empty() {
            executed += 1;
            if executed > MAX_OPERATIONS {
                return Err(DwarfError::OperationLimit(MAX_OPERATIONS));
            }

            let op = cursor.read_u8()?;
            match op {
                DW_OP_ADDR => machine.push(cursor.address()?),
                DW_OP_CONST1U => machine.push(cursor.read_u8()? as u64),
                DW_OP_CONST1S => machine.push(cursor.read_i8()? as i64 as u64),
                DW_OP_CONST2U => machine.push(cursor.read_u16()? as u64),
                DW_OP_CONST2S => machine.push(cursor.read_i16()? as i64 as u64),
                DW_OP_CONST4U => machine.push(cursor.read_u32()? as u64),
                DW_OP_CONST4S => machine.push(cursor.read_i32()? as i64 as u64),
                DW_OP_CONST8U => machine.push(cursor.read_u64()?),
                DW_OP_CONST8S => machine.push(cursor.read_i64()? as u64),
                DW_OP_CONSTU => machine.push(cursor.read_uleb128()?),
                DW_OP_CONSTS => machine.push(cursor.read_sleb128()? as u64),
                DW_OP_LIT0..=DW_OP_LIT31 => machine.push((op - DW_OP_LIT0) as u64),

                DW_OP_DUP => {
                    let top = machine.peek(op, 0)?;
                    machine.push(top);
                }
                DW_OP_DROP => {
                    machine.pop(op)?;
                }
                DW_OP_OVER => {
                    let second = machine.peek(op, 1)?;
                    machine.push(second);
                }
                DW_OP_PICK => {
                    let index = cursor.read_u8()? as usize;
                    let value = machine.peek(op, index)?;
                    machine.push(value);
                }
                DW_OP_SWAP => {
                    let top = machine.pop(op)?;
                    let second = machine.pop(op)?;
                    machine.push(top);
                    machine.push(second);
                }
                DW_OP_ROT => {
                    let first = machine.pop(op)?;
                    let second = machine.pop(op)?;
                    let third = machine.pop(op)?;
                    machine.push(first);
                    machine.push(third);
                    machine.push(second);
                }

                DW_OP_ABS => {
                    let value = machine.pop(op)? as i64;
                    machine.push(value.wrapping_abs() as u64);
                }
                DW_OP_NEG => {
                    let value = machine.pop(op)? as i64;
                    machine.push(value.wrapping_neg() as u64);
                }
                DW_OP_NOT => {
                    let value = machine.pop(op)?;
                    machine.push(!value);
                }
                DW_OP_PLUS_UCONST => {
                    let addend = cursor.read_uleb128()?;
                    let value = machine.pop(op)?;
                    machine.push(value.wrapping_add(addend));
                }
                DW_OP_AND | DW_OP_DIV | DW_OP_MINUS | DW_OP_MOD | DW_OP_MUL | DW_OP_OR
                | DW_OP_PLUS | DW_OP_SHL | DW_OP_SHR | DW_OP_SHRA | DW_OP_XOR | DW_OP_EQ
                | DW_OP_GE | DW_OP_GT | DW_OP_LE | DW_OP_LT | DW_OP_NE => {
                    let top = machine.pop(op)?;
                    let second = machine.pop(op)?;
                    machine.push(binary(op, second, top)?);
                }

                DW_OP_SKIP => {
                    let offset = cursor.read_i16()?;
                    branch(&mut cursor, offset)?;
                }
                DW_OP_BRA => {
                    let offset = cursor.read_i16()?;
                    if machine.pop(op)? != 0 {
                        branch(&mut cursor, offset)?;
                    }
                }

                DW_OP_REG0..=DW_OP_REG31 => {
                    return Ok(ExpressionResult::Register((op - DW_OP_REG0) as u64));
                }
                DW_OP_REGX => {
                    return Ok(ExpressionResult::Register(cursor.read_uleb128()?));
                }
                DW_OP_IMPLICIT_VALUE => {
                    let len = cursor.read_uleb128()? as usize;
                    let bytes = cursor.read_bytes(len)?;
                    return Ok(ExpressionResult::Implicit(bytes.to_vec()));
                }
                DW_OP_STACK_VALUE => {
                    return Ok(ExpressionResult::Literal(machine.pop(op)?));
                }
                DW_OP_NOP => {}

                // Everything below needs target memory, registers or a frame.
                DW_OP_DEREF
                | DW_OP_XDEREF
                | DW_OP_DEREF_SIZE
                | DW_OP_XDEREF_SIZE
                | DW_OP_FBREG
                | DW_OP_BREGX
                | DW_OP_BREG0..=DW_OP_BREG31
                | DW_OP_PIECE
                | DW_OP_BIT_PIECE
                | DW_OP_PUSH_OBJECT_ADDRESS
                | DW_OP_CALL2
                | DW_OP_CALL4
                | DW_OP_CALL_REF
                | DW_OP_FORM_TLS_ADDRESS
                | DW_OP_CALL_FRAME_CFA => return Err(DwarfError::UnsupportedOperation(op)),
                _ => return Err(DwarfError::UnsupportedOperation(op)),
            }
        }

        let top = machine.stack.last().copied().ok_or(DwarfError::StackUnderflow(0))?;
        Ok(ExpressionResult::Address(top))
    }
}

struct Machine {
    stack: Vec<u64>,
}

impl Machine {
    fn push(&mut self, value: u64) {
        self.stack.push(value);
    }

    fn pop(&mut self, op: u8) -> Result<u64> {
        self.stack.pop().ok_or(DwarfError::StackUnderflow(op))
    }

    /// `depth` 0 is the top of the stack.
    fn peek(&self, op: u8, depth: usize) -> Result<u64> {
        if depth >= self.stack.len() {
            return Err(DwarfError::StackUnderflow(op));
        }
        Ok(self.stack[self.stack.len() - 1 - depth])
    }
}

fn binary(op: u8, second: u64, top: u64) -> Result<u64> {
    let (a, b) = (second as i64, top as i64);
    Ok(match op {
        DW_OP_AND => second & top,
        DW_OP_OR => second | top,
        DW_OP_XOR => second ^ top,
        DW_OP_PLUS => second.wrapping_add(top),
        DW_OP_MINUS => second.wrapping_sub(top),
        DW_OP_MUL => second.wrapping_mul(top),
        DW_OP_DIV => {
            if b == 0 {
                return Err(DwarfError::DivisionByZero);
            }
            a.wrapping_div(b) as u64
        }
        DW_OP_MOD => {
            if top == 0 {
                return Err(DwarfError::DivisionByZero);
            }
            second % top
        }
        DW_OP_SHL => second.checked_shl(top.min(64) as u32).unwrap_or(0),
        DW_OP_SHR => second.checked_shr(top.min(64) as u32).unwrap_or(0),
        DW_OP_SHRA => {
            if top >= 64 {
                if a < 0 {
                    u64::MAX
                } else {
                    0
                }
            } else {
                (a >> top) as u64
            }
        }
        DW_OP_EQ => (a == b) as u64,
        DW_OP_GE => (a >= b) as u64,
        DW_OP_GT => (a > b) as u64,
        DW_OP_LE => (a <= b) as u64,
        DW_OP_LT => (a < b) as u64,
        DW_OP_NE => (a != b) as u64,
        _ => return Err(DwarfError::UnsupportedOperation(op)),
    })
}

fn branch(cursor: &mut Cursor<'_>, offset: i16) -> Result<()> {
    let section = cursor.section();
    let target = cursor.position() as i64 + offset as i64;
    if target < section.begin as i64 || target > section.end as i64 {
        return Err(DwarfError::InvalidBranch(target));
    }
    cursor.set_position(target as usize);
    Ok(())
}
