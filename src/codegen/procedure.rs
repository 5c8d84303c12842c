//! The procedure prologue/epilogue: the stack-shuffle that makes room for
//! uninitialised return slots ahead of the pushed arguments, and the
//! matching teardown at `end`.

use crate::context::procedure_label;

/// Emit the lines that bind a freshly-arrived set of identifiers into the
/// runtime symbols table. `variables[i]` sits `((len-1-i) * 8)` bytes above
/// the current `rsp` — the same layout `where` uses for its own bindings.
pub fn bind_variables(variables: &[String]) -> Vec<String> {
    let mut inst = Vec::new();
    let len = variables.len();
    for (i, item) in variables.iter().enumerate() {
        let stack_location = (len - 1 - i) * 8;
        inst.push(format!("    ;; Bind {item} {stack_location}"));
        inst.push("    mov     rax, rsp".to_string());
        inst.push(format!("    add     rax, {stack_location}"));
        inst.push("    mov     rcx, [symbols]".to_string());
        inst.push("    mov     [rcx], rax".to_string());
        inst.push("    add     rcx, 8".to_string());
        inst.push("    mov     [symbols], rcx".to_string());
    }
    inst
}

/// Entry sequence for `procedure <name> ... in`.
///
/// `main` only needs the symbols-table head pointer initialised. Every other
/// procedure additionally shuffles the call-site stack: the pushed
/// arguments are shifted down by `(returns + 1) * 8` bytes to make room for
/// the return slots, the return address is moved past them, and `rsp` is
/// adjusted to reserve the new slots — all before the identifiers are bound.
pub fn emit_entry(name: &str, inputs: &[String], returns: &[String]) -> (Vec<String>, Vec<String>) {
    let mut input_variables = vec!["__return_address".to_string()];
    input_variables.extend(inputs.iter().cloned());
    let mut all_variables = returns.to_vec();
    all_variables.extend(input_variables.iter().cloned());

    let mut inst = vec![format!("{}:", procedure_label(name))];

    if name == "main" {
        inst.push("    ;; Setup the symbols table".to_string());
        inst.push("    mov     rcx, symbols".to_string());
        inst.push("    add     rcx, 8".to_string());
        inst.push("    mov     [symbols], rcx".to_string());
        return (inst, all_variables);
    }

    inst.push("    ;; Shift everything to make space for the address and return variables".to_string());
    let original_variables: Vec<String> =
        inputs.iter().cloned().chain(std::iter::once("__return_address".to_string())).collect();
    let shift_amount = (returns.len() + 1) * 8;
    let shift_back_amount = input_variables.len() * 8 - shift_amount;

    if input_variables.len() > 1 {
        for (i, variable) in original_variables.iter().rev().enumerate() {
            let src = signed_offset(i as i64 * 8);
            let dst = signed_offset(i as i64 * 8 - shift_amount as i64);
            inst.push(format!("    mov     rcx, [rsp {src}]"));
            inst.push(format!("    mov     [rsp {dst}], rcx  ;; Move {variable} ahead"));
        }
        let src = signed_offset(-(shift_amount as i64));
        let dst = signed_offset(shift_back_amount as i64);
        inst.push(format!("    mov     rcx, [rsp {src}]"));
        inst.push(format!("    mov     [rsp {dst}], rcx  ;; Move return address back"));
    } else {
        inst.push("    mov     rcx, [rsp]  ;; Take the return address".to_string());
        let dst = signed_offset(-(returns.len() as i64 * 8));
        inst.push(format!("    mov     [rsp {dst}], rcx  ;; Move it forward making space for the return variables"));
    }
    inst.push(format!("    sub     rsp, {}  ;; Resize the stack accordingly", shift_amount - 8));

    inst.extend(bind_variables(&all_variables));

    (inst, all_variables)
}

fn signed_offset(n: i64) -> String {
    if n >= 0 { format!("+{n}") } else { n.to_string() }
}

/// Teardown at the `end` of a procedure body.
pub fn emit_exit(name: &str, inputs: &[String], returns: &[String]) -> Vec<String> {
    if name == "main" {
        return vec![
            "    mov     rdi, 0   ;; EXIT".to_string(),
            "    mov     rax, SYS_EXIT".to_string(),
            "    syscall".to_string(),
        ];
    }
    let total = returns.len() + 1 + inputs.len();
    vec![
        "    ;; Remove variables from the symbols table".to_string(),
        "    mov     rcx, [symbols]".to_string(),
        format!("    sub     rcx, {}", total * 8),
        "    mov     [symbols], rcx".to_string(),
        "    ;; Remove variables from the stack".to_string(),
        format!("    add     rsp, {}", 8 * inputs.len()),
        "    ret".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_entry_only_initialises_the_symbols_head() {
        let (inst, vars) = emit_entry("main", &[], &[]);
        assert_eq!(inst[0], "_start:");
        assert!(inst.iter().any(|l| l.contains("mov     [symbols], rcx")));
        assert!(vars.is_empty());
    }

    #[test]
    fn non_main_entry_shuffles_and_binds_every_variable() {
        let (inst, vars) = emit_entry("add", &["a".to_string(), "b".to_string()], &["c".to_string()]);
        assert_eq!(inst[0], "procedure_add:");
        assert_eq!(vars, vec!["c", "__return_address", "a", "b"]);
        assert!(inst.iter().any(|l| l.contains("Resize the stack")));
        assert!(inst.iter().any(|l| l.contains(";; Bind c")));
    }

    #[test]
    fn main_exit_emits_a_zero_status_syscall() {
        let inst = emit_exit("main", &[], &[]);
        assert!(inst.iter().any(|l| l.contains("SYS_EXIT")));
    }

    #[test]
    fn non_main_exit_deallocates_inputs_and_returns() {
        let inst = emit_exit("add", &["a".to_string(), "b".to_string()], &["c".to_string()]);
        assert!(inst.iter().any(|l| l.contains("add     rsp, 16")));
        assert!(inst.iter().any(|l| l == "    ret"));
    }
}
