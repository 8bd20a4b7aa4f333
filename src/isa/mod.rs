//! The instruction set: mnemonic identity, the family each mnemonic
//! belongs to (which fixes its encoding skeleton and pipeline behavior),
//! and the 32-bit pack/unpack codec.
//!
//! The original design models an instruction as a polymorphic value with
//! virtual `IF`/`ID`/`EX`/`MEM`/`WB` hooks, one implementation per opcode.
//! Here that becomes a flat, closed `Opcode` enum plus a handful of
//! classifying methods (`family`, `reads_gpr`, `writes_gpr`, ...); the
//! stage *behavior* itself lives as a single match per stage in
//! `pipeline::stages`, mirroring the flat opcode dispatch the teacher's
//! processor core already uses instead of a trait-object hierarchy.

mod encode;

pub use encode::{pack, unpack, DecodeError};

/// The pipeline-relevant grouping of an opcode. Fixes operand kinds and
/// which stage does the "real" work.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Family {
    AluR,
    AluI,
    Load,
    Store,
    Branch,
    Jump,
    FpArith,
    FpLoadStore,
    FpMove,
    FpConvert,
    Control,
}

/// One operand position's expected kind, used by the assembler to validate
/// an instruction's operand list against its mnemonic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// `%R` - a GPR.
    Gpr,
    /// `%F` - an FPR.
    Fpr,
    /// `%I` - a signed immediate.
    Immediate,
    /// `%U` - an unsigned immediate.
    UnsignedImmediate,
    /// `%L` - a label, resolved to a PC-relative branch offset.
    BranchLabel,
    /// `%B` - a label, resolved to an absolute byte/word jump target.
    JumpLabel,
}

macro_rules! opcodes {
    ($($variant:ident => $mnemonic:literal, $family:ident;)*) => {
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            pub fn family(self) -> Family {
                match self {
                    $(Opcode::$variant => Family::$family,)*
                }
            }

            pub fn from_mnemonic(s: &str) -> Option<Opcode> {
                let upper = s.to_ascii_uppercase();
                match upper.as_str() {
                    $($mnemonic => Some(Opcode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Add    => "ADD",    AluR;
    Addu   => "ADDU",   AluR;
    Sub    => "SUB",    AluR;
    Subu   => "SUBU",   AluR;
    And    => "AND",    AluR;
    Or     => "OR",     AluR;
    Xor    => "XOR",    AluR;
    Nor    => "NOR",    AluR;
    Sll    => "SLL",    AluR;
    Srl    => "SRL",    AluR;
    Sra    => "SRA",    AluR;
    Sllv   => "SLLV",   AluR;
    Srlv   => "SRLV",   AluR;
    Srav   => "SRAV",   AluR;
    Slt    => "SLT",    AluR;
    Sltu   => "SLTU",   AluR;
    Mult   => "MULT",   AluR;
    Div    => "DIV",    AluR;

    Addi   => "ADDI",   AluI;
    Addiu  => "ADDIU",  AluI;
    Andi   => "ANDI",   AluI;
    Ori    => "ORI",    AluI;
    Xori   => "XORI",   AluI;
    Lui    => "LUI",    AluI;
    Slti   => "SLTI",   AluI;
    Sltiu  => "SLTIU",  AluI;

    Lb     => "LB",     Load;
    Lbu    => "LBU",    Load;
    Lh     => "LH",     Load;
    Lhu    => "LHU",    Load;
    Lw     => "LW",     Load;
    Lwu    => "LWU",    Load;
    Ld     => "LD",     Load;
    Sb     => "SB",     Store;
    Sh     => "SH",     Store;
    Sw     => "SW",     Store;
    Sd     => "SD",     Store;

    LdC1   => "L.D",    FpLoadStore;
    SdC1   => "S.D",    FpLoadStore;
    MovD   => "MOV.D",  FpMove;
    CvtDL  => "CVT.D.L", FpConvert;
    CvtLD  => "CVT.L.D", FpConvert;

    AddD   => "ADD.D",  FpArith;
    SubD   => "SUB.D",  FpArith;
    MulD   => "MUL.D",  FpArith;
    DivD   => "DIV.D",  FpArith;

    Beq    => "BEQ",    Branch;
    Bne    => "BNE",    Branch;
    Beqz   => "BEQZ",   Branch;
    Bnez   => "BNEZ",   Branch;
    Bgez   => "BGEZ",   Branch;
    Bltz   => "BLTZ",   Branch;

    J      => "J",      Jump;
    Jal    => "JAL",    Jump;
    Jr     => "JR",     Jump;
    Jalr   => "JALR",   Jump;

    Halt     => "HALT",    Control;
    Syscall  => "SYSCALL", Control;
    Break    => "BREAK",   Control;
    Trap     => "TRAP",    Control;
    Nop      => "NOP",     Control;
}

impl Opcode {
    /// Whether the instruction dispatches into the FP sub-pipeline at the
    /// end of ID instead of proceeding to the integer EX stage.
    pub fn is_fp_arithmetic(self) -> bool {
        self.family() == Family::FpArith
    }

    pub fn is_load(self) -> bool {
        self.family() == Family::Load || self == Opcode::LdC1
    }

    pub fn is_store(self) -> bool {
        self.family() == Family::Store || self == Opcode::SdC1
    }

    pub fn is_branch(self) -> bool {
        self.family() == Family::Branch
    }

    pub fn is_jump(self) -> bool {
        self.family() == Family::Jump
    }

    pub fn is_terminating(self) -> bool {
        matches!(self, Opcode::Halt | Opcode::Syscall)
    }

    /// The operand kinds this mnemonic expects, in source order, for the
    /// assembler's arity/kind check. A `Load`/`Store`/`FpLoadStore` operand
    /// list counts the `offset(base)` addressing form as two positions (an
    /// immediate then a GPR) rather than inventing a seventh `OperandKind`
    /// for it.
    pub fn operand_syntax(self) -> &'static [OperandKind] {
        use OperandKind::*;
        match self {
            Opcode::Add
            | Opcode::Addu
            | Opcode::Sub
            | Opcode::Subu
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Nor
            | Opcode::Slt
            | Opcode::Sltu => &[Gpr, Gpr, Gpr],

            Opcode::Sll | Opcode::Srl | Opcode::Sra => &[Gpr, Gpr, Immediate],
            Opcode::Sllv | Opcode::Srlv | Opcode::Srav => &[Gpr, Gpr, Gpr],
            Opcode::Mult | Opcode::Div => &[Gpr, Gpr],

            Opcode::Addi | Opcode::Addiu | Opcode::Slti | Opcode::Sltiu => {
                &[Gpr, Gpr, Immediate]
            }
            Opcode::Andi | Opcode::Ori | Opcode::Xori => &[Gpr, Gpr, UnsignedImmediate],
            Opcode::Lui => &[Gpr, UnsignedImmediate],

            Opcode::Lb
            | Opcode::Lbu
            | Opcode::Lh
            | Opcode::Lhu
            | Opcode::Lw
            | Opcode::Lwu
            | Opcode::Ld
            | Opcode::Sb
            | Opcode::Sh
            | Opcode::Sw
            | Opcode::Sd => &[Gpr, Immediate, Gpr],

            Opcode::LdC1 | Opcode::SdC1 => &[Fpr, Immediate, Gpr],

            Opcode::MovD | Opcode::CvtDL | Opcode::CvtLD => &[Fpr, Fpr],
            Opcode::AddD | Opcode::SubD | Opcode::MulD | Opcode::DivD => &[Fpr, Fpr, Fpr],

            Opcode::Beq | Opcode::Bne => &[Gpr, Gpr, BranchLabel],
            Opcode::Beqz | Opcode::Bnez | Opcode::Bgez | Opcode::Bltz => &[Gpr, BranchLabel],

            Opcode::J | Opcode::Jal => &[JumpLabel],
            Opcode::Jr => &[Gpr],
            // `gpr_destination` hardcodes R31 for `Jalr` regardless of a
            // written `rd`, so the assembler only ever reads `rs` from
            // source text.
            Opcode::Jalr => &[Gpr],

            Opcode::Halt | Opcode::Syscall | Opcode::Break | Opcode::Trap | Opcode::Nop => &[],
        }
    }
}

/// A fully decoded instruction, as it rides the pipeline. The listed
/// register fields are -1 (encoded as `None`) when not meaningful for this
/// opcode's family.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub rs: u8,
    pub rt: u8,
    pub rd: u8,
    pub shamt: u8,
    /// Sign- or zero-extended immediate, per opcode convention; also used
    /// to carry a resolved branch-offset or data address for loads/stores.
    pub immediate: i64,
    /// Absolute word address for `J`/`JAL`.
    pub target: u64,
    pub encoding: u32,
}

impl Instruction {
    pub fn gpr_sources(&self) -> Vec<usize> {
        match self.opcode.family() {
            Family::AluR => vec![self.rs as usize, self.rt as usize],
            Family::AluI => vec![self.rs as usize],
            Family::Load => vec![self.rs as usize],
            Family::Store => vec![self.rs as usize, self.rt as usize],
            Family::Branch => match self.opcode {
                Opcode::Beq | Opcode::Bne => vec![self.rs as usize, self.rt as usize],
                _ => vec![self.rs as usize],
            },
            Family::Jump => match self.opcode {
                Opcode::Jr | Opcode::Jalr => vec![self.rs as usize],
                _ => vec![],
            },
            Family::FpLoadStore => vec![self.rs as usize],
            _ => vec![],
        }
    }

    pub fn gpr_destination(&self) -> Option<usize> {
        match self.opcode.family() {
            Family::AluR => Some(self.rd as usize),
            Family::AluI => Some(self.rt as usize),
            Family::Load => Some(self.rt as usize),
            Family::Jump if self.opcode == Opcode::Jal || self.opcode == Opcode::Jalr => {
                Some(31)
            }
            _ => None,
        }
    }

    pub fn fpr_sources(&self) -> Vec<usize> {
        match self.opcode.family() {
            Family::FpArith => vec![self.rs as usize, self.rt as usize],
            Family::FpMove | Family::FpConvert => vec![self.rs as usize],
            Family::FpLoadStore if self.opcode == Opcode::SdC1 => vec![self.rt as usize],
            _ => vec![],
        }
    }

    pub fn fpr_destination(&self) -> Option<usize> {
        match self.opcode.family() {
            Family::FpArith | Family::FpMove | Family::FpConvert => Some(self.rd as usize),
            Family::FpLoadStore if self.opcode == Opcode::LdC1 => Some(self.rt as usize),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn from_mnemonic_is_case_insensitive() {
        assert_eq!(Opcode::from_mnemonic("add"), Some(Opcode::Add));
        assert_eq!(Opcode::from_mnemonic("ADD.D"), Some(Opcode::AddD));
        assert_eq!(Opcode::from_mnemonic("bogus"), None);
    }

    #[test]
    fn alu_r_reads_two_writes_rd() {
        let instr = Instruction {
            opcode: Opcode::Add,
            rs: 1,
            rt: 2,
            rd: 3,
            shamt: 0,
            immediate: 0,
            target: 0,
            encoding: 0,
        };
        assert_eq!(instr.gpr_sources(), vec![1, 2]);
        assert_eq!(instr.gpr_destination(), Some(3));
    }

    #[test]
    fn load_syntax_counts_the_offset_base_pair_as_two_positions() {
        assert_eq!(
            Opcode::Lw.operand_syntax(),
            &[OperandKind::Gpr, OperandKind::Immediate, OperandKind::Gpr]
        );
    }

    #[test]
    fn jal_writes_return_address_register() {
        let instr = Instruction {
            opcode: Opcode::Jal,
            rs: 0,
            rt: 0,
            rd: 0,
            shamt: 0,
            immediate: 0,
            target: 100,
            encoding: 0,
        };
        assert_eq!(instr.gpr_destination(), Some(31));
    }
}
