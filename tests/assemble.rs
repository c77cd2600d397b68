mod common;

use common::{assemble, assemble_err, label_address};
use forge86::core::error::AsmErrorKind;

#[test]
fn boot_sector_style_program() {
    let source = "\
org 0x7c00
bits 16

start:
    cli
    xor ax, ax
    mov ds, ax
    mov si, msg
    cld
.print:
    lodsb
    cmp al, 0
    je .done
    mov ah, 0x0e
    int 0x10
    jmp .print
.done:
    hlt
msg db 'Hi', 0
sig dw 0xaa55
";
    let unit = assemble(source);
    let expected: Vec<u8> = vec![
        0xFA, // cli
        0x31, 0xC0, // xor ax, ax
        0x8E, 0xD8, // mov ds, ax
        0xBE, 0x15, 0x7C, // mov si, msg
        0xFC, // cld
        0xAC, // lodsb
        0x3C, 0x00, // cmp al, 0
        0x74, 0x06, // je .done
        0xB4, 0x0E, // mov ah, 0x0e
        0xCD, 0x10, // int 0x10
        0xEB, 0xF5, // jmp .print
        0xF4, // hlt
        0x48, 0x69, 0x00, // msg
        0x55, 0xAA, // sig
    ];
    assert_eq!(unit.bytes, expected);
    assert_eq!(label_address(&unit, "start"), 0x7C00);
    assert_eq!(label_address(&unit, "start.print"), 0x7C09);
    assert_eq!(label_address(&unit, "start.done"), 0x7C14);
    assert_eq!(label_address(&unit, "msg"), 0x7C15);
    assert_eq!(label_address(&unit, "sig"), 0x7C18);
}

#[test]
fn accumulator_forms_prefer_short_opcodes() {
    let unit = assemble("mov al, 0x0\nadd al, 0x3\nsub al, 0x1");
    assert_eq!(unit.bytes, vec![0xB0, 0x00, 0x04, 0x03, 0x2C, 0x01]);
}

#[test]
fn short_jump_stays_short_within_reach() {
    let padding = "x".repeat(126);
    let source = format!("jmp done\nmsg db '{padding}'\ndone:\nhlt");
    let unit = assemble(&source);
    assert_eq!(unit.bytes[..2], [0xEB, 0x7E]);
}

#[test]
fn short_jump_flips_to_near_at_128_bytes() {
    let padding = "x".repeat(128);
    let source = format!("jmp done\nmsg db '{padding}'\ndone:\nhlt");
    let unit = assemble(&source);
    // E9 with disp16 = 128
    assert_eq!(unit.bytes[..3], [0xE9, 0x80, 0x00]);
}

#[test]
fn forced_short_jump_out_of_range_fails() {
    let padding = "x".repeat(128);
    let source = format!("jmp short done\nmsg db '{padding}'\ndone:\nhlt");
    let err = assemble_err(&source);
    assert_eq!(err.kind(), AsmErrorKind::NoMatchingEncoding);
}

#[test]
fn base_index_pair_encodes_mod_zero() {
    let unit = assemble("mov [bx+si], al");
    assert_eq!(unit.bytes, vec![0x88, 0x00]);
}

#[test]
fn bp_alone_is_never_mod_zero() {
    let unit = assemble("mov [bp], al");
    assert_eq!(unit.bytes, vec![0x88, 0x46, 0x00]);
}

#[test]
fn scale_of_three_fails_with_location() {
    let err = assemble_err("nop\nmov al, [si*3]");
    assert_eq!(err.kind(), AsmErrorKind::InvalidScale);
    let span = err.span().expect("span");
    assert_eq!(span.line, 2);
    assert_eq!(span.col_start, 13);
}

#[test]
fn far_jump_and_interrupt_vector_table() {
    let source = "\
org 0
vectors:
    dw handler
    dw 0
handler:
    iret
entry:
    jmp 0x0:handler
";
    let unit = assemble(source);
    assert_eq!(
        unit.bytes,
        vec![
            0x04, 0x00, // dw handler
            0x00, 0x00, // dw 0
            0xCF, // iret
            0xEA, 0x04, 0x00, 0x00, 0x00, // jmp 0x0:handler
        ]
    );
}

#[test]
fn string_block_copy_with_prefixes() {
    let source = "\
copy:
    mov cx, 0x100
    rep movsw
    ret
";
    let unit = assemble(source);
    assert_eq!(unit.bytes, vec![0xB9, 0x00, 0x01, 0xF3, 0xA5, 0xC3]);
}

#[test]
fn equ_and_memory_operands_mix() {
    let source = "\
cols equ 80
    mov ax, cols
    mov word [bx+2], 0x101
    shl ax, 1
";
    let unit = assemble(source);
    assert_eq!(
        unit.bytes,
        vec![
            0xB8, 0x50, 0x00, // mov ax, 80
            0xC7, 0x47, 0x02, 0x01, 0x01, // mov word [bx+2], 0x101
            0xD1, 0xE0, // shl ax, 1
        ]
    );
}

#[test]
fn sign_extended_immediate_uses_group_83() {
    let unit = assemble("add bx, 2\ncmp word [si], 1");
    assert_eq!(
        unit.bytes,
        vec![
            0x83, 0xC3, 0x02, // add bx, 2
            0x83, 0x3C, 0x01, // cmp word [si], 1
        ]
    );
}

#[test]
fn missing_size_override_is_reported() {
    let err = assemble_err("mov [bx], 1");
    assert_eq!(err.kind(), AsmErrorKind::MissingSizeOverride);
}

#[test]
fn unknown_label_is_reported() {
    let err = assemble_err("call missing_routine");
    assert_eq!(err.kind(), AsmErrorKind::UnknownLabel);
}

#[test]
fn convergence_count_is_exposed() {
    let unit = assemble("jmp done\nmov al, 0\ndone:\nhlt");
    // seeding, one shrinking refinement, one stable pass
    assert_eq!(unit.passes, 3);
}

#[test]
fn output_concatenates_in_ast_order() {
    let unit = assemble("db 1\nmov al, 2\ndb 3");
    assert_eq!(unit.bytes, vec![0x01, 0xB0, 0x02, 0x03]);
}
