#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    Add,
    Run,
    Copy,
}

/// One half of a code table entry. A size of 0 means the size follows the
/// opcode in the instruction stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub ty: Type,
    pub size: u8,
    pub mode: u8,
}

impl Instruction {
    const fn new(ty: Type, size: u8, mode: u8) -> Self {
        Self { ty, size, mode }
    }
}

pub type CodeTable = [(Instruction, Option<Instruction>); 256];

/// RFC 3284 section 5.6.
pub const DEFAULT_CODE_TABLE: CodeTable = default_code_table();

const fn default_code_table() -> CodeTable {
    let mut table = [(Instruction::new(Type::Run, 0, 0), None); 256];

    let mut index = 1;
    let mut size = 0;
    while size <= 17 {
        table[index] = (Instruction::new(Type::Add, size, 0), None);
        index += 1;
        size += 1;
    }

    let mut mode = 0;
    while mode <= 8 {
        table[index] = (Instruction::new(Type::Copy, 0, mode), None);
        index += 1;

        let mut size = 4;
        while size <= 18 {
            table[index] = (Instruction::new(Type::Copy, size, mode), None);
            index += 1;
            size += 1;
        }
        mode += 1;
    }

    let mut mode = 0;
    while mode <= 8 {
        let last_copy_size = if mode < 6 { 6 } else { 4 };

        let mut add_size = 1;
        while add_size <= 4 {
            let mut copy_size = 4;
            while copy_size <= last_copy_size {
                table[index] = (
                    Instruction::new(Type::Add, add_size, 0),
                    Some(Instruction::new(Type::Copy, copy_size, mode)),
                );
                index += 1;
                copy_size += 1;
            }
            add_size += 1;
        }
        mode += 1;
    }

    let mut mode = 0;
    while mode <= 8 {
        table[index] = (
            Instruction::new(Type::Copy, 4, mode),
            Some(Instruction::new(Type::Add, 1, 0)),
        );
        index += 1;
        mode += 1;
    }

    table
}
