/*
 ═══════════════════════════════════════════════════════════════════════════════
  SENTINEL SHIELD - EVM Opcode Table
 ═══════════════════════════════════════════════════════════════════════════════
*/

/// A decoded EVM opcode. PUSH/DUP/SWAP variants collapse their width into the
/// single canonical variant; callers needing the width read it off the
/// `Instruction::push_size` field instead, so this table stays flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Stop,
    Add,
    Mul,
    Sub,
    Div,
    Sdiv,
    Mod,
    Smod,
    Addmod,
    Mulmod,
    Exp,
    SignExtend,

    Lt,
    Gt,
    Slt,
    Sgt,
    Eq,
    IsZero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,

    Sha3,

    Address,
    Balance,
    Origin,
    Caller,
    CallValue,
    CallDataLoad,
    CallDataSize,
    CallDataCopy,
    CodeSize,
    CodeCopy,
    GasPrice,
    ExtCodeSize,
    ExtCodeCopy,
    ReturnDataSize,
    ReturnDataCopy,
    ExtCodeHash,

    BlockHash,
    Coinbase,
    Timestamp,
    Number,
    Difficulty,
    GasLimit,
    ChainId,
    SelfBalance,
    BaseFee,

    Pop,
    MLoad,
    MStore,
    MStore8,
    SLoad,
    SStore,
    Jump,
    Jumpi,
    Pc,
    MSize,
    Gas,
    JumpDest,

    Push(u8),
    Dup(u8),
    Swap(u8),

    Log(u8),

    Create,
    Call,
    CallCode,
    Return,
    DelegateCall,
    Create2,
    StaticCall,
    Revert,
    Invalid,
    SelfDestruct,

    /// An opcode byte with no assigned meaning. Carries the raw byte so the
    /// report can show `INVALID_<hex>` as §4.1 specifies.
    Unassigned(u8),
}

impl Opcode {
    /// Decode a single opcode byte. Multi-byte immediates (PUSH) are handled
    /// by the disassembler, not here.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => Opcode::Stop,
            0x01 => Opcode::Add,
            0x02 => Opcode::Mul,
            0x03 => Opcode::Sub,
            0x04 => Opcode::Div,
            0x05 => Opcode::Sdiv,
            0x06 => Opcode::Mod,
            0x07 => Opcode::Smod,
            0x08 => Opcode::Addmod,
            0x09 => Opcode::Mulmod,
            0x0a => Opcode::Exp,
            0x0b => Opcode::SignExtend,

            0x10 => Opcode::Lt,
            0x11 => Opcode::Gt,
            0x12 => Opcode::Slt,
            0x13 => Opcode::Sgt,
            0x14 => Opcode::Eq,
            0x15 => Opcode::IsZero,
            0x16 => Opcode::And,
            0x17 => Opcode::Or,
            0x18 => Opcode::Xor,
            0x19 => Opcode::Not,
            0x1a => Opcode::Byte,
            0x1b => Opcode::Shl,
            0x1c => Opcode::Shr,
            0x1d => Opcode::Sar,

            0x20 => Opcode::Sha3,

            0x30 => Opcode::Address,
            0x31 => Opcode::Balance,
            0x32 => Opcode::Origin,
            0x33 => Opcode::Caller,
            0x34 => Opcode::CallValue,
            0x35 => Opcode::CallDataLoad,
            0x36 => Opcode::CallDataSize,
            0x37 => Opcode::CallDataCopy,
            0x38 => Opcode::CodeSize,
            0x39 => Opcode::CodeCopy,
            0x3a => Opcode::GasPrice,
            0x3b => Opcode::ExtCodeSize,
            0x3c => Opcode::ExtCodeCopy,
            0x3d => Opcode::ReturnDataSize,
            0x3e => Opcode::ReturnDataCopy,
            0x3f => Opcode::ExtCodeHash,

            0x40 => Opcode::BlockHash,
            0x41 => Opcode::Coinbase,
            0x42 => Opcode::Timestamp,
            0x43 => Opcode::Number,
            0x44 => Opcode::Difficulty,
            0x45 => Opcode::GasLimit,
            0x46 => Opcode::ChainId,
            0x47 => Opcode::SelfBalance,
            0x48 => Opcode::BaseFee,

            0x50 => Opcode::Pop,
            0x51 => Opcode::MLoad,
            0x52 => Opcode::MStore,
            0x53 => Opcode::MStore8,
            0x54 => Opcode::SLoad,
            0x55 => Opcode::SStore,
            0x56 => Opcode::Jump,
            0x57 => Opcode::Jumpi,
            0x58 => Opcode::Pc,
            0x59 => Opcode::MSize,
            0x5a => Opcode::Gas,
            0x5b => Opcode::JumpDest,

            0x60..=0x7f => Opcode::Push(byte - 0x5f),
            0x80..=0x8f => Opcode::Dup(byte - 0x7f),
            0x90..=0x9f => Opcode::Swap(byte - 0x8f),
            0xa0..=0xa4 => Opcode::Log(byte - 0xa0),

            0xf0 => Opcode::Create,
            0xf1 => Opcode::Call,
            0xf2 => Opcode::CallCode,
            0xf3 => Opcode::Return,
            0xf4 => Opcode::DelegateCall,
            0xf5 => Opcode::Create2,
            0xfa => Opcode::StaticCall,
            0xfd => Opcode::Revert,
            0xfe => Opcode::Invalid,
            0xff => Opcode::SelfDestruct,

            other => Opcode::Unassigned(other),
        }
    }

    /// Number of immediate bytes this opcode consumes (PUSH1..PUSH32 only).
    pub fn push_size(&self) -> usize {
        match self {
            Opcode::Push(n) => *n as usize,
            _ => 0,
        }
    }

    /// True for the instructions that end a basic block per §4.2.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Jump
                | Opcode::Jumpi
                | Opcode::Stop
                | Opcode::Return
                | Opcode::Revert
                | Opcode::SelfDestruct
                | Opcode::Invalid
                | Opcode::Unassigned(_)
        )
    }

    /// True for instructions after which control never falls through (§3
    /// CFG invariant (c)).
    pub fn is_halting(&self) -> bool {
        matches!(
            self,
            Opcode::Stop | Opcode::Return | Opcode::Revert | Opcode::SelfDestruct
        )
    }

    /// The mnemonic used in reports and the disassembly artifact. Unknown
    /// opcodes render as `INVALID_<hex>` per §4.1.
    pub fn mnemonic(&self) -> String {
        match self {
            Opcode::Stop => "STOP".into(),
            Opcode::Add => "ADD".into(),
            Opcode::Mul => "MUL".into(),
            Opcode::Sub => "SUB".into(),
            Opcode::Div => "DIV".into(),
            Opcode::Sdiv => "SDIV".into(),
            Opcode::Mod => "MOD".into(),
            Opcode::Smod => "SMOD".into(),
            Opcode::Addmod => "ADDMOD".into(),
            Opcode::Mulmod => "MULMOD".into(),
            Opcode::Exp => "EXP".into(),
            Opcode::SignExtend => "SIGNEXTEND".into(),
            Opcode::Lt => "LT".into(),
            Opcode::Gt => "GT".into(),
            Opcode::Slt => "SLT".into(),
            Opcode::Sgt => "SGT".into(),
            Opcode::Eq => "EQ".into(),
            Opcode::IsZero => "ISZERO".into(),
            Opcode::And => "AND".into(),
            Opcode::Or => "OR".into(),
            Opcode::Xor => "XOR".into(),
            Opcode::Not => "NOT".into(),
            Opcode::Byte => "BYTE".into(),
            Opcode::Shl => "SHL".into(),
            Opcode::Shr => "SHR".into(),
            Opcode::Sar => "SAR".into(),
            Opcode::Sha3 => "SHA3".into(),
            Opcode::Address => "ADDRESS".into(),
            Opcode::Balance => "BALANCE".into(),
            Opcode::Origin => "ORIGIN".into(),
            Opcode::Caller => "CALLER".into(),
            Opcode::CallValue => "CALLVALUE".into(),
            Opcode::CallDataLoad => "CALLDATALOAD".into(),
            Opcode::CallDataSize => "CALLDATASIZE".into(),
            Opcode::CallDataCopy => "CALLDATACOPY".into(),
            Opcode::CodeSize => "CODESIZE".into(),
            Opcode::CodeCopy => "CODECOPY".into(),
            Opcode::GasPrice => "GASPRICE".into(),
            Opcode::ExtCodeSize => "EXTCODESIZE".into(),
            Opcode::ExtCodeCopy => "EXTCODECOPY".into(),
            Opcode::ReturnDataSize => "RETURNDATASIZE".into(),
            Opcode::ReturnDataCopy => "RETURNDATACOPY".into(),
            Opcode::ExtCodeHash => "EXTCODEHASH".into(),
            Opcode::BlockHash => "BLOCKHASH".into(),
            Opcode::Coinbase => "COINBASE".into(),
            Opcode::Timestamp => "TIMESTAMP".into(),
            Opcode::Number => "NUMBER".into(),
            Opcode::Difficulty => "DIFFICULTY".into(),
            Opcode::GasLimit => "GASLIMIT".into(),
            Opcode::ChainId => "CHAINID".into(),
            Opcode::SelfBalance => "SELFBALANCE".into(),
            Opcode::BaseFee => "BASEFEE".into(),
            Opcode::Pop => "POP".into(),
            Opcode::MLoad => "MLOAD".into(),
            Opcode::MStore => "MSTORE".into(),
            Opcode::MStore8 => "MSTORE8".into(),
            Opcode::SLoad => "SLOAD".into(),
            Opcode::SStore => "SSTORE".into(),
            Opcode::Jump => "JUMP".into(),
            Opcode::Jumpi => "JUMPI".into(),
            Opcode::Pc => "PC".into(),
            Opcode::MSize => "MSIZE".into(),
            Opcode::Gas => "GAS".into(),
            Opcode::JumpDest => "JUMPDEST".into(),
            Opcode::Push(n) => format!("PUSH{}", n),
            Opcode::Dup(n) => format!("DUP{}", n),
            Opcode::Swap(n) => format!("SWAP{}", n),
            Opcode::Log(n) => format!("LOG{}", n),
            Opcode::Create => "CREATE".into(),
            Opcode::Call => "CALL".into(),
            Opcode::CallCode => "CALLCODE".into(),
            Opcode::Return => "RETURN".into(),
            Opcode::DelegateCall => "DELEGATECALL".into(),
            Opcode::Create2 => "CREATE2".into(),
            Opcode::StaticCall => "STATICCALL".into(),
            Opcode::Revert => "REVERT".into(),
            Opcode::Invalid => "INVALID".into(),
            Opcode::SelfDestruct => "SELFDESTRUCT".into(),
            Opcode::Unassigned(b) => format!("INVALID_{:02x}", b),
        }
    }

    /// Taint-source opcodes per §4.6.
    pub fn is_taint_source(&self) -> bool {
        matches!(
            self,
            Opcode::CallDataLoad
                | Opcode::CallValue
                | Opcode::Caller
                | Opcode::Origin
                | Opcode::CallDataSize
                | Opcode::CallDataCopy
                | Opcode::GasPrice
        )
    }

    /// Comparison opcodes that contribute `comparison` guard evidence (§4.7).
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Opcode::Eq | Opcode::Lt | Opcode::Gt | Opcode::Slt | Opcode::Sgt
        )
    }

    /// Opcodes that can halt a side branch with `revert` guard evidence.
    pub fn is_revert(&self) -> bool {
        matches!(self, Opcode::Revert)
    }

    /// Arithmetic/memory opcodes that block backward target-resolution scans
    /// in §4.3 ("before any stack-mutating arithmetic instruction").
    pub fn blocks_static_resolution(&self) -> bool {
        matches!(
            self,
            Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::MLoad
                | Opcode::SLoad
                | Opcode::Jump
                | Opcode::Jumpi
        )
    }

    /// Sensitive-sink opcodes from the §4.8 addendum.
    pub fn is_sensitive_sink(&self) -> bool {
        matches!(
            self,
            Opcode::SelfDestruct | Opcode::DelegateCall | Opcode::CallCode
        )
    }
}
