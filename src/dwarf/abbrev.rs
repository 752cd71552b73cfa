use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::dwarf::constants::{DwarfAttr, DwarfTag, Form, ValueKind};
use crate::dwarf::cursor::Cursor;
use crate::error::{DwarfError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeSpec {
    pub name: DwarfAttr,
    pub form: Form,
    pub kind: ValueKind,
    /// Value stored in the table itself for `DW_FORM_implicit_const`.
    pub implicit_const: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Abbreviation {
    pub code: u64,
    pub tag: DwarfTag,
    pub has_children: bool,
    pub specs: Vec<AttributeSpec>,
}

impl Abbreviation {
    pub fn position(&self, name: DwarfAttr) -> Option<usize> {
        self.specs.iter().position(|spec| spec.name == name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct AbbreviationTable {
    entries: HashMap<u64, Rc<Abbreviation>>,
}

impl AbbreviationTable {
    /// Decodes records from the cursor position until the terminating zero code.
    pub fn parse(cursor: &mut Cursor<'_>) -> Result<Self> {
        let start = cursor.position();
        let mut entries = HashMap::new();

        loop {
            let code = cursor.read_uleb128()?;
            if code == 0 {
                break;
            }
            let tag = cursor.read_uleb128()?;
            let has_children = cursor.read_u8()? != 0;
            let mut specs = Vec::new();
            loop {
                let name = cursor.read_uleb128()?;
                let raw_form = cursor.read_uleb128()?;
                if name == 0 && raw_form == 0 {
                    break;
                }
                let form = Form::from_raw(raw_form);
                let implicit_const = if form == Form::ImplicitConst {
                    Some(cursor.read_sleb128()?)
                } else {
                    None
                };
                specs.push(AttributeSpec {
                    name,
                    form,
                    kind: form.value_kind(),
                    implicit_const,
                });
            }
            entries.insert(
                code,
                Rc::new(Abbreviation {
                    code,
                    tag,
                    has_children,
                    specs,
                }),
            );
        }

        debug!(
            "abbreviation table at {start:#x}: {} entries",
            entries.len()
        );
        Ok(Self { entries })
    }

    pub fn get(&self, code: u64) -> Result<&Rc<Abbreviation>> {
        self.entries
            .get(&code)
            .ok_or(DwarfError::UnknownAbbrev(code))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
