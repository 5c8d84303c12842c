//! The fixed literal assembly assets: section declarations, reserved
//! storage, and the `peek` decimal-print helper. These are copied
//! byte-for-byte from the reference implementation; they are a fixed asset,
//! not a subject of design.

pub const MEMORY_CAPACITY: usize = 1024 * 1024;
pub const SYMBOLS_TABLE_SIZE: usize = 512;

pub fn header() -> String {
    format!(
        r#"%define SYS_EXIT 60
%define SYS_WRITE 1
%define STD_OUT 1
%define TRUE 1
%define FALSE 0
global _start

segment .bss
memory:   resb {MEMORY_CAPACITY}
symbols:   resb {SYMBOLS_TABLE_SIZE}

segment .text

peek:
    mov     r9, -3689348814741910323
    sub     rsp, 40
    mov     BYTE [rsp+31], 10
    lea     rcx, [rsp+30]
.L2:
    mov     rax, rdi
    lea     r8, [rsp+32]
    mul     r9
    mov     rax, rdi
    sub     r8, rcx
    shr     rdx, 3
    lea     rsi, [rdx+rdx*4]
    add     rsi, rsi
    sub     rax, rsi
    add     eax, 48
    mov     BYTE [rcx], al
    mov     rax, rdi
    mov     rdi, rdx
    mov     rdx, rcx
    sub     rcx, 1
    cmp     rax, 9
    ja      .L2
    lea     rax, [rsp+32]
    mov     edi, 1
    sub     rdx, rax
    xor     eax, eax
    lea     rsi, [rsp+32+rdx]
    mov     rdx, r8
    mov     rax, SYS_WRITE
    syscall
    add     rsp, 40
    ret
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_declares_the_required_sections_and_symbols() {
        let text = header();
        assert!(text.contains("global _start"));
        assert!(text.contains("segment .bss"));
        assert!(text.contains("segment .text"));
        assert!(text.contains("memory:   resb 1048576"));
        assert!(text.contains("symbols:   resb 512"));
        assert!(text.contains("peek:"));
    }
}
