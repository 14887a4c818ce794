//! Support for decoding conversation bytecode out of `CNV.ARK` blocks.
//!
//! Each block is one NPC conversation: a fixed header, an import table
//! binding names to engine-provided variables and functions, and a code
//! stream for a small stack machine. We only decode the stream, we never run
//! it.
//!
//! The instruction set is a closed list of `u16` opcodes; a fixed subset
//! carries one inline `u16` immediate. Words outside the list are *not*
//! errors: the engine understands more than we do, so unknown words pass
//! through as no-ops carrying the raw word. Extraction must never die on
//! them.

use std::io::{Cursor, Read as _};

use anyhow::{Context, Result, bail};
use binrw::BinRead;
use bytes::Bytes;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;
use serde::Serialize;
use tracing::warn;

#[derive(BinRead, Debug, Clone, Copy)]
#[br(little)]
struct ConversationHeader {
    _unk0: u16,
    _unk1: u16,
    /// Code stream length in u16 words.
    code_size: u16,
    _unk3: u16,
    _unk4: u16,
    /// String block in `STRINGS.PAK` holding this conversation's text.
    string_block: u16,
    /// Size of the conversation's variable memory.
    num_variables: u16,
    num_imports: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportType {
    Variable,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReturnType {
    Void,
    Int,
    String,
}

/// One import table entry: an engine variable or callback the bytecode
/// references by id.
#[derive(Debug, Clone, Serialize)]
pub struct Import {
    pub name: String,
    /// Variable memory address or function id, depending on the type.
    pub id_or_addr: u16,
    pub import_type: ImportType,
    pub return_type: ReturnType,
}

/// The stack machine's instruction set, in opcode order (0x00..=0x29).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, Serialize, strum::Display)]
pub enum Opcode {
    Nop = 0x00,
    Add = 0x01,
    Mul = 0x02,
    Sub = 0x03,
    Div = 0x04,
    Mod = 0x05,
    Or = 0x06,
    And = 0x07,
    Not = 0x08,
    TstGt = 0x09,
    TstGe = 0x0A,
    TstLt = 0x0B,
    TstLe = 0x0C,
    TstEq = 0x0D,
    TstNe = 0x0E,
    Jmp = 0x0F,
    Beq = 0x10,
    Bne = 0x11,
    Bra = 0x12,
    Call = 0x13,
    CallImported = 0x14,
    Ret = 0x15,
    PushImm = 0x16,
    PushAddr = 0x17,
    Pop = 0x18,
    Swap = 0x19,
    PushBp = 0x1A,
    PopBp = 0x1B,
    SpToBp = 0x1C,
    BpToSp = 0x1D,
    AddSp = 0x1E,
    Fetch = 0x1F,
    Store = 0x20,
    Offset = 0x21,
    Start = 0x22,
    SaveReg = 0x23,
    PushReg = 0x24,
    StrCmp = 0x25,
    Exit = 0x26,
    Say = 0x27,
    Respond = 0x28,
    Neg = 0x29,
}

impl Opcode {
    /// The closed set of opcodes that consume one inline `u16` immediate.
    pub fn has_operand(self) -> bool {
        matches!(
            self,
            Opcode::Jmp
                | Opcode::Beq
                | Opcode::Bne
                | Opcode::Bra
                | Opcode::Call
                | Opcode::CallImported
                | Opcode::PushImm
                | Opcode::PushAddr
        )
    }
}

/// One decoded instruction. Addresses count u16 words from the start of the
/// code stream.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Instruction {
    pub address: u16,
    pub opcode: Opcode,
    pub operand: Option<i16>,
}

impl Instruction {
    /// Word count this instruction occupies in the stream.
    pub fn size(&self) -> u16 {
        if self.operand.is_some() && self.opcode.has_operand() {
            2
        } else {
            1
        }
    }

    /// Jump/call destination, if this is a control transfer. `Jmp` and
    /// `Call` operands are absolute word addresses; the conditional branches
    /// and `Bra` are relative to the word after the operand, with the
    /// operand read as signed.
    pub fn branch_target(&self) -> Option<u16> {
        let operand = self.operand?;
        match self.opcode {
            Opcode::Jmp | Opcode::Call => Some(operand as u16),
            Opcode::Beq | Opcode::Bne | Opcode::Bra => {
                Some((self.address as i32 + 2 + operand as i32) as u16)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Conversation {
    /// Slot in `CNV.ARK`, which is also the NPC's `whoami` value.
    pub slot: u16,
    pub string_block: u16,
    pub num_variables: u16,
    pub imports: Vec<Import>,
    pub code: Vec<Instruction>,
}

impl Conversation {
    pub fn parse(slot: u16, data: &Bytes) -> Result<Conversation> {
        let mut cur = Cursor::new(data.as_ref());
        let header =
            ConversationHeader::read_le(&mut cur).context("Reading conversation header")?;

        let mut imports = Vec::with_capacity(header.num_imports as usize);
        for i in 0..header.num_imports {
            imports
                .push(parse_import(&mut cur).with_context(|| format!("Reading import record {i}"))?);
        }

        let code = parse_code(&mut cur, header.code_size).context("Reading code stream")?;

        Ok(Conversation {
            slot,
            string_block: header.string_block,
            num_variables: header.num_variables,
            imports,
            code,
        })
    }
}

fn parse_import(cur: &mut Cursor<&[u8]>) -> Result<Import> {
    let name_len = u16::read_le(cur)?;
    let mut name = vec![0u8; name_len as usize];
    cur.read_exact(&mut name).context("Reading import name")?;
    let name = String::from_utf8(name).context("Import name is not ascii")?;

    let id_or_addr = u16::read_le(cur)?;
    let _unknown = u16::read_le(cur)?;
    let import_type = match u16::read_le(cur)? {
        0x010F => ImportType::Variable,
        0x0111 => ImportType::Function,
        other => bail!("unknown import type {:#06x}", other),
    };
    let return_type = match u16::read_le(cur)? {
        0x0000 => ReturnType::Void,
        0x0129 => ReturnType::Int,
        0x012B => ReturnType::String,
        other => bail!("unknown import return type {:#06x}", other),
    };

    Ok(Import {
        name,
        id_or_addr,
        import_type,
        return_type,
    })
}

fn parse_code(cur: &mut Cursor<&[u8]>, code_size: u16) -> Result<Vec<Instruction>> {
    // u32 so that an operand at the very end of a 0xFFFF-word stream cannot
    // overflow the address arithmetic
    let code_size = code_size as u32;
    let mut code = Vec::new();
    let mut address = 0u32;
    while address < code_size {
        let word =
            u16::read_le(cur).with_context(|| format!("Reading code word at {address:#06x}"))?;
        match Opcode::from_u16(word) {
            Some(opcode) if opcode.has_operand() => {
                if address + 1 >= code_size {
                    // a real stream never ends inside an operand; keep the
                    // word around as data instead of failing the whole parse
                    warn!(address, word, "operand would run past the end of the code");
                    code.push(Instruction {
                        address: address as u16,
                        opcode: Opcode::Nop,
                        operand: Some(word as i16),
                    });
                    address += 1;
                    continue;
                }
                let operand = u16::read_le(cur)
                    .with_context(|| format!("Reading operand at {address:#06x}"))?;
                code.push(Instruction {
                    address: address as u16,
                    opcode,
                    operand: Some(operand as i16),
                });
                address += 2;
            }
            Some(opcode) => {
                code.push(Instruction {
                    address: address as u16,
                    opcode,
                    operand: None,
                });
                address += 1;
            }
            None => {
                // unknown opcode: tolerated, passed through
                code.push(Instruction {
                    address: address as u16,
                    opcode: Opcode::Nop,
                    operand: Some(word as i16),
                });
                address += 1;
            }
        }
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use num_traits::FromPrimitive as _;

    use super::{Conversation, ImportType, Opcode, ReturnType};

    fn conversation(imports: &[(&str, u16, u16, u16)], code: &[u16]) -> Bytes {
        let mut data = Vec::new();
        for word in [
            0u16,
            0x0828,
            code.len() as u16,
            0,
            0,
            0x0E17,           // string block
            5,                // variables
            imports.len() as u16,
        ] {
            data.extend_from_slice(&word.to_le_bytes());
        }
        for &(name, id, ty, ret) in imports {
            data.extend_from_slice(&(name.len() as u16).to_le_bytes());
            data.extend_from_slice(name.as_bytes());
            for word in [id, 0xBEEF, ty, ret] {
                data.extend_from_slice(&word.to_le_bytes());
            }
        }
        for &word in code {
            data.extend_from_slice(&word.to_le_bytes());
        }
        Bytes::from(data)
    }

    #[test]
    fn parses_header_and_imports() {
        let data = conversation(
            &[
                ("babl_menu", 0x0000, 0x0111, 0x0000),
                ("play_hunger", 0x001F, 0x010F, 0x0129),
            ],
            &[0x15],
        );
        let conv = Conversation::parse(7, &data).unwrap();
        assert_eq!(conv.slot, 7);
        assert_eq!(conv.string_block, 0x0E17);
        assert_eq!(conv.num_variables, 5);

        assert_eq!(conv.imports.len(), 2);
        assert_eq!(conv.imports[0].name, "babl_menu");
        assert_eq!(conv.imports[0].import_type, ImportType::Function);
        assert_eq!(conv.imports[0].return_type, ReturnType::Void);
        assert_eq!(conv.imports[1].name, "play_hunger");
        assert_eq!(conv.imports[1].id_or_addr, 0x001F);
        assert_eq!(conv.imports[1].import_type, ImportType::Variable);
        assert_eq!(conv.imports[1].return_type, ReturnType::Int);
    }

    #[test]
    fn operand_opcodes_consume_exactly_one_extra_word() {
        for raw in 0x00..=0x29u16 {
            let opcode = Opcode::from_u16(raw).unwrap();
            let code = if opcode.has_operand() {
                vec![raw, 0x1234, 0x15]
            } else {
                vec![raw, 0x15]
            };
            let conv = Conversation::parse(0, &conversation(&[], &code)).unwrap();
            assert_eq!(conv.code.len(), 2, "opcode {raw:#04x}");
            assert_eq!(conv.code[0].opcode, opcode);
            assert_eq!(
                conv.code[0].operand,
                opcode.has_operand().then_some(0x1234),
                "opcode {raw:#04x}"
            );
            // the trailing RET always lands right after
            assert_eq!(conv.code[1].opcode, Opcode::Ret);
            assert_eq!(conv.code[1].address, if opcode.has_operand() { 2 } else { 1 });
        }
    }

    #[test]
    fn unknown_words_pass_through_as_nops() {
        let conv = Conversation::parse(0, &conversation(&[], &[0x2A, 0x7777, 0x15])).unwrap();
        assert_eq!(conv.code.len(), 3);
        assert_eq!(conv.code[0].opcode, Opcode::Nop);
        assert_eq!(conv.code[0].operand, Some(0x2A));
        assert_eq!(conv.code[1].opcode, Opcode::Nop);
        assert_eq!(conv.code[1].operand, Some(0x7777));
        assert_eq!(conv.code[2].opcode, Opcode::Ret);
    }

    #[test]
    fn branch_targets() {
        // JMP 0x0030 is absolute
        let conv = Conversation::parse(
            0,
            &conversation(&[], &[0x0F, 0x0030, 0x12, 0xFFFC, 0x15]),
        )
        .unwrap();
        assert_eq!(conv.code[0].branch_target(), Some(0x0030));
        // BRA at address 2 with operand -4: 2 + 2 - 4 = 0
        assert_eq!(conv.code[1].branch_target(), Some(0));
        // RET is not a control transfer
        assert_eq!(conv.code[2].branch_target(), None);
    }

    #[test]
    fn truncated_operand_degrades_to_a_nop() {
        let conv = Conversation::parse(0, &conversation(&[], &[0x15, 0x0F])).unwrap();
        assert_eq!(conv.code.len(), 2);
        assert_eq!(conv.code[1].opcode, Opcode::Nop);
        assert_eq!(conv.code[1].operand, Some(0x0F));
    }

    #[test]
    fn unknown_import_type_is_an_error() {
        let data = conversation(&[("x", 0, 0x0112, 0)], &[0x15]);
        assert!(Conversation::parse(0, &data).is_err());
    }
}
