// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction schema catalog for the 8086 instruction set.
//!
//! Operand notation:
//! `rb`/`rw` register byte/word, `sr` segment register, `rmb`/`rmw`
//! register-or-memory, `m`/`mb`/`mw`/`md` memory, `ib`/`iw` immediate,
//! `ib_se` immediate sign-extendable to a byte, `pb` port byte,
//! `sl`/`ll`/`np` short/long relative label and near pointer, `fptr` far
//! pointer, `ifptr` indirect far pointer, `moffs` displacement-only memory,
//! a bare register name matches exactly that register.
//!
//! Binary notation:
//! hex pairs are literal bytes, `mr` the ModRM byte (`/0`..`/7` pin its reg
//! field), `i0`..`i3` immediate bytes, `r0`/`r1` relative displacement
//! bytes, `o0`/`o1` and `s0`/`s1` far-pointer offset/segment halves,
//! `d0`/`d1` displacement bytes (moffs forms only; ModRM displacements are
//! materialized per operand at resolution time).
//!
//! See the classic x86 reference table at
//! <http://www.mathemainzel.info/files/x86asmref.html>.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::x86::schema::{OperandMatcher, Schema};

type Row = (&'static str, &'static str, &'static str);

#[rustfmt::skip]
static ROWS: &[Row] = &[
    // data movement
    ("mov", "al, moffs", "a0 d0 d1"),
    ("mov", "ax, moffs", "a1 d0 d1"),
    ("mov", "moffs, al", "a2 d0 d1"),
    ("mov", "moffs, ax", "a3 d0 d1"),
    ("mov", "al, ib", "b0 i0"),
    ("mov", "cl, ib", "b1 i0"),
    ("mov", "dl, ib", "b2 i0"),
    ("mov", "bl, ib", "b3 i0"),
    ("mov", "ah, ib", "b4 i0"),
    ("mov", "ch, ib", "b5 i0"),
    ("mov", "dh, ib", "b6 i0"),
    ("mov", "bh, ib", "b7 i0"),
    ("mov", "ax, iw", "b8 i0 i1"),
    ("mov", "cx, iw", "b9 i0 i1"),
    ("mov", "dx, iw", "ba i0 i1"),
    ("mov", "bx, iw", "bb i0 i1"),
    ("mov", "sp, iw", "bc i0 i1"),
    ("mov", "bp, iw", "bd i0 i1"),
    ("mov", "si, iw", "be i0 i1"),
    ("mov", "di, iw", "bf i0 i1"),
    ("mov", "rmb, rb", "88 mr"),
    ("mov", "rmw, rw", "89 mr"),
    ("mov", "rb, rmb", "8a mr"),
    ("mov", "rw, rmw", "8b mr"),
    ("mov", "rmw, sr", "8c mr"),
    ("mov", "sr, rmw", "8e mr"),
    ("mov", "rmb, ib", "c6 /0 i0"),
    ("mov", "rmw, iw", "c7 /0 i0 i1"),

    ("xchg", "ax, cx", "91"),
    ("xchg", "cx, ax", "91"),
    ("xchg", "ax, dx", "92"),
    ("xchg", "dx, ax", "92"),
    ("xchg", "ax, bx", "93"),
    ("xchg", "bx, ax", "93"),
    ("xchg", "ax, sp", "94"),
    ("xchg", "sp, ax", "94"),
    ("xchg", "ax, bp", "95"),
    ("xchg", "bp, ax", "95"),
    ("xchg", "ax, si", "96"),
    ("xchg", "si, ax", "96"),
    ("xchg", "ax, di", "97"),
    ("xchg", "di, ax", "97"),
    ("xchg", "rmb, rb", "86 mr"),
    ("xchg", "rb, rmb", "86 mr"),
    ("xchg", "rmw, rw", "87 mr"),
    ("xchg", "rw, rmw", "87 mr"),

    ("lea", "rw, m", "8d mr"),
    ("les", "rw, m", "c4 mr"),
    ("lds", "rw, m", "c5 mr"),
    ("xlat", "", "d7"),
    ("xlatb", "", "d7"),

    // ALU group: base opcodes 00/08/10/18/20/28/30/38, group-1 /0../7
    ("add", "al, ib", "04 i0"),
    ("add", "ax, iw", "05 i0 i1"),
    ("add", "rmb, rb", "00 mr"),
    ("add", "rmw, rw", "01 mr"),
    ("add", "rb, rmb", "02 mr"),
    ("add", "rw, rmw", "03 mr"),
    ("add", "rmw, ib_se", "83 /0 i0"),
    ("add", "rmb, ib", "80 /0 i0"),
    ("add", "rmw, iw", "81 /0 i0 i1"),

    ("or", "al, ib", "0c i0"),
    ("or", "ax, iw", "0d i0 i1"),
    ("or", "rmb, rb", "08 mr"),
    ("or", "rmw, rw", "09 mr"),
    ("or", "rb, rmb", "0a mr"),
    ("or", "rw, rmw", "0b mr"),
    ("or", "rmw, ib_se", "83 /1 i0"),
    ("or", "rmb, ib", "80 /1 i0"),
    ("or", "rmw, iw", "81 /1 i0 i1"),

    ("adc", "al, ib", "14 i0"),
    ("adc", "ax, iw", "15 i0 i1"),
    ("adc", "rmb, rb", "10 mr"),
    ("adc", "rmw, rw", "11 mr"),
    ("adc", "rb, rmb", "12 mr"),
    ("adc", "rw, rmw", "13 mr"),
    ("adc", "rmw, ib_se", "83 /2 i0"),
    ("adc", "rmb, ib", "80 /2 i0"),
    ("adc", "rmw, iw", "81 /2 i0 i1"),

    ("sbb", "al, ib", "1c i0"),
    ("sbb", "ax, iw", "1d i0 i1"),
    ("sbb", "rmb, rb", "18 mr"),
    ("sbb", "rmw, rw", "19 mr"),
    ("sbb", "rb, rmb", "1a mr"),
    ("sbb", "rw, rmw", "1b mr"),
    ("sbb", "rmw, ib_se", "83 /3 i0"),
    ("sbb", "rmb, ib", "80 /3 i0"),
    ("sbb", "rmw, iw", "81 /3 i0 i1"),

    ("and", "al, ib", "24 i0"),
    ("and", "ax, iw", "25 i0 i1"),
    ("and", "rmb, rb", "20 mr"),
    ("and", "rmw, rw", "21 mr"),
    ("and", "rb, rmb", "22 mr"),
    ("and", "rw, rmw", "23 mr"),
    ("and", "rmw, ib_se", "83 /4 i0"),
    ("and", "rmb, ib", "80 /4 i0"),
    ("and", "rmw, iw", "81 /4 i0 i1"),

    ("sub", "al, ib", "2c i0"),
    ("sub", "ax, iw", "2d i0 i1"),
    ("sub", "rmb, rb", "28 mr"),
    ("sub", "rmw, rw", "29 mr"),
    ("sub", "rb, rmb", "2a mr"),
    ("sub", "rw, rmw", "2b mr"),
    ("sub", "rmw, ib_se", "83 /5 i0"),
    ("sub", "rmb, ib", "80 /5 i0"),
    ("sub", "rmw, iw", "81 /5 i0 i1"),

    ("xor", "al, ib", "34 i0"),
    ("xor", "ax, iw", "35 i0 i1"),
    ("xor", "rmb, rb", "30 mr"),
    ("xor", "rmw, rw", "31 mr"),
    ("xor", "rb, rmb", "32 mr"),
    ("xor", "rw, rmw", "33 mr"),
    ("xor", "rmw, ib_se", "83 /6 i0"),
    ("xor", "rmb, ib", "80 /6 i0"),
    ("xor", "rmw, iw", "81 /6 i0 i1"),

    ("cmp", "al, ib", "3c i0"),
    ("cmp", "ax, iw", "3d i0 i1"),
    ("cmp", "rmb, rb", "38 mr"),
    ("cmp", "rmw, rw", "39 mr"),
    ("cmp", "rb, rmb", "3a mr"),
    ("cmp", "rw, rmw", "3b mr"),
    ("cmp", "rmw, ib_se", "83 /7 i0"),
    ("cmp", "rmb, ib", "80 /7 i0"),
    ("cmp", "rmw, iw", "81 /7 i0 i1"),

    ("test", "al, ib", "a8 i0"),
    ("test", "ax, iw", "a9 i0 i1"),
    ("test", "rmb, rb", "84 mr"),
    ("test", "rmw, rw", "85 mr"),
    ("test", "rmb, ib", "f6 /0 i0"),
    ("test", "rmw, iw", "f7 /0 i0 i1"),

    // unary group
    ("inc", "ax", "40"),
    ("inc", "cx", "41"),
    ("inc", "dx", "42"),
    ("inc", "bx", "43"),
    ("inc", "sp", "44"),
    ("inc", "bp", "45"),
    ("inc", "si", "46"),
    ("inc", "di", "47"),
    ("inc", "rmb", "fe /0"),
    ("inc", "rmw", "ff /0"),
    ("dec", "ax", "48"),
    ("dec", "cx", "49"),
    ("dec", "dx", "4a"),
    ("dec", "bx", "4b"),
    ("dec", "sp", "4c"),
    ("dec", "bp", "4d"),
    ("dec", "si", "4e"),
    ("dec", "di", "4f"),
    ("dec", "rmb", "fe /1"),
    ("dec", "rmw", "ff /1"),
    ("not", "rmb", "f6 /2"),
    ("not", "rmw", "f7 /2"),
    ("neg", "rmb", "f6 /3"),
    ("neg", "rmw", "f7 /3"),
    ("mul", "rmb", "f6 /4"),
    ("mul", "rmw", "f7 /4"),
    ("imul", "rmb", "f6 /5"),
    ("imul", "rmw", "f7 /5"),
    ("div", "rmb", "f6 /6"),
    ("div", "rmw", "f7 /6"),
    ("idiv", "rmb", "f6 /7"),
    ("idiv", "rmw", "f7 /7"),

    // stack
    ("push", "ax", "50"),
    ("push", "cx", "51"),
    ("push", "dx", "52"),
    ("push", "bx", "53"),
    ("push", "sp", "54"),
    ("push", "bp", "55"),
    ("push", "si", "56"),
    ("push", "di", "57"),
    ("push", "es", "06"),
    ("push", "cs", "0e"),
    ("push", "ss", "16"),
    ("push", "ds", "1e"),
    ("push", "rmw", "ff /6"),
    ("pop", "ax", "58"),
    ("pop", "cx", "59"),
    ("pop", "dx", "5a"),
    ("pop", "bx", "5b"),
    ("pop", "sp", "5c"),
    ("pop", "bp", "5d"),
    ("pop", "si", "5e"),
    ("pop", "di", "5f"),
    ("pop", "es", "07"),
    ("pop", "ss", "17"),
    ("pop", "ds", "1f"),
    ("pop", "rmw", "8f /0"),
    ("pushf", "", "9c"),
    ("popf", "", "9d"),

    // shifts and rotates: group-2 /0../7
    ("rol", "rmb, 1", "d0 /0"),
    ("rol", "rmw, 1", "d1 /0"),
    ("rol", "rmb, cl", "d2 /0"),
    ("rol", "rmw, cl", "d3 /0"),
    ("rol", "rmb, ib", "c0 /0 i0"),
    ("rol", "rmw, ib", "c1 /0 i0"),
    ("ror", "rmb, 1", "d0 /1"),
    ("ror", "rmw, 1", "d1 /1"),
    ("ror", "rmb, cl", "d2 /1"),
    ("ror", "rmw, cl", "d3 /1"),
    ("ror", "rmb, ib", "c0 /1 i0"),
    ("ror", "rmw, ib", "c1 /1 i0"),
    ("rcl", "rmb, 1", "d0 /2"),
    ("rcl", "rmw, 1", "d1 /2"),
    ("rcl", "rmb, cl", "d2 /2"),
    ("rcl", "rmw, cl", "d3 /2"),
    ("rcl", "rmb, ib", "c0 /2 i0"),
    ("rcl", "rmw, ib", "c1 /2 i0"),
    ("rcr", "rmb, 1", "d0 /3"),
    ("rcr", "rmw, 1", "d1 /3"),
    ("rcr", "rmb, cl", "d2 /3"),
    ("rcr", "rmw, cl", "d3 /3"),
    ("rcr", "rmb, ib", "c0 /3 i0"),
    ("rcr", "rmw, ib", "c1 /3 i0"),
    ("shl", "rmb, 1", "d0 /4"),
    ("shl", "rmw, 1", "d1 /4"),
    ("shl", "rmb, cl", "d2 /4"),
    ("shl", "rmw, cl", "d3 /4"),
    ("shl", "rmb, ib", "c0 /4 i0"),
    ("shl", "rmw, ib", "c1 /4 i0"),
    ("sal", "rmb, 1", "d0 /4"),
    ("sal", "rmw, 1", "d1 /4"),
    ("sal", "rmb, cl", "d2 /4"),
    ("sal", "rmw, cl", "d3 /4"),
    ("sal", "rmb, ib", "c0 /4 i0"),
    ("sal", "rmw, ib", "c1 /4 i0"),
    ("shr", "rmb, 1", "d0 /5"),
    ("shr", "rmw, 1", "d1 /5"),
    ("shr", "rmb, cl", "d2 /5"),
    ("shr", "rmw, cl", "d3 /5"),
    ("shr", "rmb, ib", "c0 /5 i0"),
    ("shr", "rmw, ib", "c1 /5 i0"),
    ("sar", "rmb, 1", "d0 /7"),
    ("sar", "rmw, 1", "d1 /7"),
    ("sar", "rmb, cl", "d2 /7"),
    ("sar", "rmw, cl", "d3 /7"),
    ("sar", "rmb, ib", "c0 /7 i0"),
    ("sar", "rmw, ib", "c1 /7 i0"),

    // control flow
    ("jmp", "sl", "eb r0"),
    ("jmp", "np", "e9 r0 r1"),
    ("jmp", "rmw", "ff /4"),
    ("jmp", "ifptr", "ff /5"),
    ("jmp", "fptr", "ea o0 o1 s0 s1"),
    ("call", "np", "e8 r0 r1"),
    ("call", "rmw", "ff /2"),
    ("call", "ifptr", "ff /3"),
    ("call", "fptr", "9a o0 o1 s0 s1"),
    ("ret", "", "c3"),
    ("ret", "iw", "c2 i0 i1"),
    ("retf", "", "cb"),
    ("retf", "iw", "ca i0 i1"),
    ("iret", "", "cf"),
    ("int", "ib", "cd i0"),
    ("int3", "", "cc"),
    ("into", "", "ce"),
    ("loop", "sl", "e2 r0"),
    ("loope", "sl", "e1 r0"),
    ("loopz", "sl", "e1 r0"),
    ("loopne", "sl", "e0 r0"),
    ("loopnz", "sl", "e0 r0"),
    ("jcxz", "sl", "e3 r0"),

    ("jo", "sl", "70 r0"),
    ("jno", "sl", "71 r0"),
    ("jb", "sl", "72 r0"),
    ("jc", "sl", "72 r0"),
    ("jnae", "sl", "72 r0"),
    ("jnb", "sl", "73 r0"),
    ("jnc", "sl", "73 r0"),
    ("jae", "sl", "73 r0"),
    ("je", "sl", "74 r0"),
    ("jz", "sl", "74 r0"),
    ("jne", "sl", "75 r0"),
    ("jnz", "sl", "75 r0"),
    ("jbe", "sl", "76 r0"),
    ("jna", "sl", "76 r0"),
    ("ja", "sl", "77 r0"),
    ("jnbe", "sl", "77 r0"),
    ("js", "sl", "78 r0"),
    ("jns", "sl", "79 r0"),
    ("jp", "sl", "7a r0"),
    ("jpe", "sl", "7a r0"),
    ("jnp", "sl", "7b r0"),
    ("jpo", "sl", "7b r0"),
    ("jl", "sl", "7c r0"),
    ("jnge", "sl", "7c r0"),
    ("jge", "sl", "7d r0"),
    ("jnl", "sl", "7d r0"),
    ("jle", "sl", "7e r0"),
    ("jng", "sl", "7e r0"),
    ("jg", "sl", "7f r0"),
    ("jnle", "sl", "7f r0"),

    // string operations
    ("movsb", "", "a4"),
    ("movsw", "", "a5"),
    ("cmpsb", "", "a6"),
    ("cmpsw", "", "a7"),
    ("stosb", "", "aa"),
    ("stosw", "", "ab"),
    ("lodsb", "", "ac"),
    ("lodsw", "", "ad"),
    ("scasb", "", "ae"),
    ("scasw", "", "af"),

    // I/O
    ("in", "al, pb", "e4 i0"),
    ("in", "ax, pb", "e5 i0"),
    ("in", "al, dx", "ec"),
    ("in", "ax, dx", "ed"),
    ("out", "pb, al", "e6 i0"),
    ("out", "pb, ax", "e7 i0"),
    ("out", "dx, al", "ee"),
    ("out", "dx, ax", "ef"),

    // flag and misc
    ("nop", "", "90"),
    ("hlt", "", "f4"),
    ("wait", "", "9b"),
    ("fwait", "", "9b"),
    ("clc", "", "f8"),
    ("stc", "", "f9"),
    ("cmc", "", "f5"),
    ("cld", "", "fc"),
    ("std", "", "fd"),
    ("cli", "", "fa"),
    ("sti", "", "fb"),
    ("lahf", "", "9f"),
    ("sahf", "", "9e"),
    ("cbw", "", "98"),
    ("cwd", "", "99"),
    ("aaa", "", "37"),
    ("aas", "", "3f"),
    ("daa", "", "27"),
    ("das", "", "2f"),
    ("aam", "", "d4 0a"),
    ("aad", "", "d5 0a"),
];

fn parse_matchers(mnemonic: &str, shorthand: &str) -> Vec<OperandMatcher> {
    if shorthand.is_empty() {
        return Vec::new();
    }
    shorthand
        .split(',')
        .map(|part| {
            let part = part.trim();
            OperandMatcher::parse(part)
                .unwrap_or_else(|| panic!("catalog bug: unknown matcher '{part}' for {mnemonic}"))
        })
        .collect()
}

fn build_catalog() -> HashMap<&'static str, Vec<Schema>> {
    let mut catalog: HashMap<&'static str, Vec<Schema>> = HashMap::new();
    for &(mnemonic, operands, template) in ROWS {
        let schema = Schema {
            mnemonic,
            matchers: parse_matchers(mnemonic, operands),
            template: Schema::parse_template(template),
        };
        catalog.entry(mnemonic).or_default().push(schema);
    }
    catalog
}

fn catalog() -> &'static HashMap<&'static str, Vec<Schema>> {
    static CATALOG: OnceLock<HashMap<&'static str, Vec<Schema>>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

/// Schemas for a mnemonic in catalog order, or `None` for an unknown
/// operation.
pub fn opcode_schemas(mnemonic: &str) -> Option<&'static [Schema]> {
    catalog().get(mnemonic).map(Vec::as_slice)
}

pub fn is_known_mnemonic(mnemonic: &str) -> bool {
    catalog().contains_key(mnemonic)
}

/// Mnemonics whose operand is a branch target; their memory operands
/// default to word size and their symbol operands are relative candidates.
pub fn is_branch_mnemonic(mnemonic: &str) -> bool {
    matches!(
        mnemonic,
        "jmp"
            | "call"
            | "loop"
            | "loope"
            | "loopz"
            | "loopne"
            | "loopnz"
            | "jcxz"
            | "jo"
            | "jno"
            | "jb"
            | "jc"
            | "jnae"
            | "jnb"
            | "jnc"
            | "jae"
            | "je"
            | "jz"
            | "jne"
            | "jnz"
            | "jbe"
            | "jna"
            | "ja"
            | "jnbe"
            | "js"
            | "jns"
            | "jp"
            | "jpe"
            | "jnp"
            | "jpo"
            | "jl"
            | "jnge"
            | "jge"
            | "jnl"
            | "jle"
            | "jng"
            | "jg"
            | "jnle"
    )
}

/// Visit every schema in the catalog (table-driven tests).
pub fn for_each_schema(mut visit: impl FnMut(&'static Schema)) {
    for schemas in catalog().values() {
        for schema in schemas {
            visit(schema);
        }
    }
}
