// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Single-pass translator from the structured source language to CASM text.
//!
//! Tokenizing, parsing and code emission are interleaved: each grammar rule
//! appends CASM lines as it recognizes its construct, so no syntax tree is
//! materialized. The primary working value always ends in register 0; binary
//! operators push the left result and pop it back with the `SP+`
//! pseudo-register.

use std::fmt;

use crate::scheduler::CancelToken;
use crate::var_table::{VarTable, VarTableResult, MAX_VARS};

/// End-of-input sentinel appended during source preparation.
const SENTINEL: char = '\u{2009}';

/// Translation failure with the 1-based source line and a trimmed snippet of
/// the offending line, computed by scanning backward from the failure point.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub line: u32,
    pub snippet: String,
}

impl CompileError {
    #[must_use]
    pub fn cancelled() -> Self {
        Self {
            message: "Translation cancelled".to_string(),
            line: 0,
            snippet: String::new(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.line == 0
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            return write!(f, "{}", self.message);
        }
        let at = if self.message.ends_with('.') || self.message.ends_with('!') {
            "At"
        } else {
            "at"
        };
        write!(f, "{} {} line {}.", self.message, at, self.line)?;
        if !self.snippet.is_empty() {
            write!(f, "\n{}<- HERE", self.snippet)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Translate source text to CASM.
pub fn translate(source: &str) -> Result<String, CompileError> {
    translate_with_cancel(source, &CancelToken::new())
}

/// Translate with a cancellation token, checked at each statement boundary.
pub fn translate_with_cancel(
    source: &str,
    cancel: &CancelToken,
) -> Result<String, CompileError> {
    Translator::new(source, cancel).run()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    If,
    Else,
    While,
    Var,
    Casm,
    Assign,
    OpenBrace,
    CloseBrace,
    End,
}

struct Translator<'a> {
    chars: Vec<char>,
    index: usize,
    look: char,
    token: Token,
    label_count: u32,
    vars: VarTable,
    out: String,
    cancel: &'a CancelToken,
}

impl<'a> Translator<'a> {
    fn new(source: &str, cancel: &'a CancelToken) -> Self {
        Self {
            chars: prepare_source(source).chars().collect(),
            index: 0,
            look: ' ',
            token: Token::End,
            label_count: 0,
            vars: VarTable::new(),
            out: String::new(),
            cancel,
        }
    }

    fn run(&mut self) -> Result<String, CompileError> {
        self.prog()?;
        if self.token != Token::End {
            return self.expected("end of program");
        }
        Ok(std::mem::take(&mut self.out))
    }

    // ---- character stream ----

    fn chars_left(&self) -> bool {
        self.index < self.chars.len()
    }

    fn get_char(&mut self) -> Result<(), CompileError> {
        if !self.chars_left() {
            return Err(self.error_here("Reached end of document unexpectedly.".to_string()));
        }
        self.look = self.chars[self.index];
        self.index += 1;
        Ok(())
    }

    fn skip_white(&mut self) -> Result<(), CompileError> {
        while self.chars_left() && matches!(self.look, ' ' | '\t' | '\n') {
            self.get_char()?;
        }
        Ok(())
    }

    fn match_char(&mut self, x: char) -> Result<(), CompileError> {
        if self.look != x {
            return self.expected(&format!("'{x}'"));
        }
        self.get_char()?;
        self.skip_white()
    }

    fn match_str(&mut self, x: &str) -> Result<(), CompileError> {
        self.skip_white()?;
        for ch in x.chars() {
            if self.look != ch {
                return self.expected(&format!("'{x}'"));
            }
            self.get_char()?;
        }
        self.skip_white()
    }

    fn get_name(&mut self) -> Result<String, CompileError> {
        self.skip_white()?;
        if !is_letter(self.look) {
            return self.expected("name");
        }
        let mut name = String::new();
        while is_letter(self.look) {
            name.push(self.look.to_ascii_uppercase());
            if self.chars_left() {
                self.get_char()?;
            } else {
                break;
            }
        }
        self.skip_white()?;
        Ok(name)
    }

    fn get_num(&mut self) -> Result<u32, CompileError> {
        self.skip_white()?;
        if !self.look.is_ascii_digit() {
            return self.expected("integer");
        }
        let mut digits = String::new();
        while self.look.is_ascii_digit() {
            digits.push(self.look);
            self.get_char()?;
        }
        self.skip_white()?;
        digits
            .parse::<u32>()
            .map_err(|_| self.error_here(format!("Integer {digits} is too large!")))
    }

    // ---- tokenizer ----

    fn get_token(&mut self) -> Result<(), CompileError> {
        self.skip_white()?;
        if is_letter(self.look) {
            let past_index = self.index;
            let name = self.get_name()?;
            self.token = match name.as_str() {
                "IF" => Token::If,
                "ELSE" => Token::Else,
                "WHILE" => Token::While,
                "VAR" => Token::Var,
                "CASM" => Token::Casm,
                _ if self.vars.contains(&name) => {
                    // rewind so the assignment rule can re-read the name
                    self.index = past_index - 1;
                    self.get_char()?;
                    Token::Assign
                }
                _ => {
                    return Err(self.error_here(format!(
                        "Encountered unknown token or variable name: {name}"
                    )))
                }
            };
        } else if self.look == '{' {
            self.token = Token::OpenBrace;
            self.get_char()?;
        } else if self.look == '}' {
            self.token = Token::CloseBrace;
            self.get_char()?;
        } else if self.look == SENTINEL {
            self.token = Token::End;
        } else {
            return self.expected("token");
        }
        Ok(())
    }

    // ---- error reporting ----

    fn expected<T>(&self, what: &str) -> Result<T, CompileError> {
        Err(self.error_here(format!("Expected {what}")))
    }

    /// Build an error located at the current position: walk back over
    /// whitespace, count newlines for the 1-based line number and slice out
    /// the offending line as a snippet.
    fn error_here(&self, message: String) -> CompileError {
        if self.index <= 1 {
            return CompileError {
                message,
                line: 1,
                snippet: String::new(),
            };
        }
        let mut idx = self.index - 2;
        while idx > 0 && matches!(self.chars[idx], ' ' | '\n') {
            idx -= 1;
        }
        let mut line = 1u32;
        let mut last_newline = 0usize;
        for (i, &c) in self.chars[..=idx].iter().enumerate() {
            if c == '\n' {
                last_newline = i;
                line += 1;
            }
        }
        let snippet: String = self.chars[last_newline..=idx].iter().collect();
        CompileError {
            message,
            line,
            snippet: snippet.trim().to_string(),
        }
    }

    // ---- emission ----

    fn emit(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn new_label(&mut self) -> u32 {
        let label = self.label_count;
        self.label_count += 1;
        label
    }

    fn post_label(&mut self, label: u32) {
        self.emit(&format!("LBL(l{label})"));
    }

    // ---- grammar ----

    fn prog(&mut self) -> Result<(), CompileError> {
        self.get_token()?;
        while self.token != Token::End {
            self.statement()?;
            self.get_token()?;
            if self.token == Token::CloseBrace {
                return Err(self.error_here("Encountered extra '}'".to_string()));
            }
        }
        Ok(())
    }

    fn block(&mut self) -> Result<(), CompileError> {
        self.get_token()?;
        while self.token != Token::CloseBrace && self.token != Token::Else {
            self.statement()?;
            self.get_token()?;
            if self.token == Token::End {
                return self.expected("}");
            }
        }
        Ok(())
    }

    fn statement(&mut self) -> Result<(), CompileError> {
        if self.cancel.is_cancelled() {
            return Err(CompileError::cancelled());
        }
        match self.token {
            Token::If => self.do_if(),
            Token::While => self.do_while(),
            Token::Var => self.add_var(),
            Token::Assign => {
                self.skip_white()?;
                if !is_letter(self.look) {
                    return self.expected("assignment statement");
                }
                let name = self.get_name()?;
                if !self.vars.contains(&name) {
                    return Err(self.error_here(format!("Variable {name} not initialized!")));
                }
                self.assignment(&name)
            }
            Token::Casm => self.do_casm(),
            Token::OpenBrace => self.block(),
            _ => self.expected("}"),
        }
    }

    fn do_if(&mut self) -> Result<(), CompileError> {
        let l1 = self.new_label();
        let mut l2 = l1;

        self.emit("// If statement - Boolean condition");
        self.match_char('(')?;
        self.bool_expression()?;
        self.emit("// If statement - Boolean condition - Check result (0 = f, other = t)");
        self.emit("PSH(r0)");
        self.emit("MOV(r0, #1)");
        self.emit("CMP(SP+, r0)");
        self.match_char(')')?;
        self.emit("// If statement - Skip block if condition evaluates false");
        self.emit(&format!("JIF(l{l1}, NOT_EQUAL)"));
        self.emit("// If statement - Conditional block");
        self.match_char('{')?;
        self.block()?;

        // ELSE may stand in place of the block's closing brace or follow it;
        // after a brace, peek one token ahead and back out if it is not ELSE
        if self.token == Token::CloseBrace {
            let saved_index = self.index;
            let saved_look = self.look;
            if self.get_token().is_err() || self.token != Token::Else {
                self.index = saved_index;
                self.look = saved_look;
                self.token = Token::CloseBrace;
            }
        }

        if self.token == Token::Else {
            l2 = self.new_label();
            self.emit("// If statement - Skip else block");
            self.emit(&format!("JMP(l{l2})"));
            self.emit("// If statement - Else block");
            self.post_label(l1);
            self.match_char('{')?;
            self.block()?;
        }

        self.post_label(l2);
        self.emit("// If statement - End");
        Ok(())
    }

    fn do_while(&mut self) -> Result<(), CompileError> {
        let l1 = self.new_label();
        let l2 = self.new_label();
        self.post_label(l1);

        self.emit("// While block - Boolean condition");
        self.match_char('(')?;
        self.bool_expression()?;
        self.emit("// While block - Boolean condition - Check result (0 = f, other = t)");
        self.emit("PSH(r0)");
        self.emit("MOV(r0, #1)");
        self.emit("CMP(SP+, r0)");
        self.match_char(')')?;
        self.emit("// While block - Jump out of block if condition evaluates false");
        self.emit(&format!("JIF(l{l2}, NOT_EQUAL)"));
        self.emit("// While block - Loop block");
        self.match_char('{')?;
        self.block()?;
        self.emit("// While block - Jump back to beginning of while");
        self.emit(&format!("JMP(l{l1})"));
        self.post_label(l2);
        self.emit("// While block - End");
        Ok(())
    }

    fn add_var(&mut self) -> Result<(), CompileError> {
        let name = self.get_name()?;
        match self.vars.declare(&name) {
            VarTableResult::TableFull => {
                return Err(self.error_here(format!(
                    "Variable {name} exceeds maximum of {MAX_VARS}!"
                )))
            }
            VarTableResult::Duplicate => {
                return Err(self.error_here(format!("Variable {name} is already declared!")))
            }
            VarTableResult::Ok => {}
        }
        if self.look == '=' {
            self.assignment(&name)?;
        }
        if self.look == ',' {
            self.match_char(',')?;
            self.add_var()?;
        }
        Ok(())
    }

    fn assignment(&mut self, name: &str) -> Result<(), CompileError> {
        self.match_char('=')?;
        self.skip_white()?;
        self.bool_expression()?;
        let slot = match self.vars.slot(name) {
            Some(slot) => slot,
            None => {
                return Err(self.error_here(format!("Variable {name} not initialized!")))
            }
        };
        self.emit(&format!("RTV(r0, v{slot}) // Variable {name}"));
        Ok(())
    }

    fn do_casm(&mut self) -> Result<(), CompileError> {
        self.match_char('{')?;
        self.skip_white()?;
        let mut casm = String::new();
        while self.look != '}' {
            if !self.chars_left() {
                return self.expected("} to close CASM block");
            }
            if self.look != ' ' {
                casm.push(self.look);
            }
            self.get_char()?;
        }
        // consume the closing brace
        self.get_token()?;
        self.emit("// Start of CASM block");
        self.emit(&casm);
        self.emit("// End of CASM block");
        Ok(())
    }

    // ---- expressions ----

    fn bool_expression(&mut self) -> Result<(), CompileError> {
        self.bool_term()?;
        while is_or_op(self.look) {
            self.emit("PSH(r0)");
            if self.look == '|' {
                self.match_char('|')?;
                self.bool_term()?;
                self.emit("OR(SP+, r0, r0)");
            } else {
                self.match_char('~')?;
                self.bool_term()?;
                self.emit("XOR(SP+, r0, r0)");
            }
        }
        Ok(())
    }

    fn bool_term(&mut self) -> Result<(), CompileError> {
        self.not_factor()?;
        while self.look == '&' {
            self.emit("PSH(r0)");
            self.match_char('&')?;
            self.not_factor()?;
            self.emit("AND(SP+, r0, r0)");
        }
        Ok(())
    }

    fn not_factor(&mut self) -> Result<(), CompileError> {
        self.skip_white()?;
        if self.look == '!' {
            self.match_char('!')?;
            self.relation()?;
            // invert the low byte of r0
            self.emit("MOV(r1, #255)");
            self.emit("XOR(r1, r0, r0)");
        } else {
            self.relation()?;
        }
        Ok(())
    }

    fn relation(&mut self) -> Result<(), CompileError> {
        self.expression()?;
        if is_rel_op(self.look) {
            self.emit("PSH(r0)");
            match self.look {
                '=' => self.rel_equals()?,
                '!' => self.rel_not_equals()?,
                '<' => self.rel_less()?,
                _ => self.rel_greater()?,
            }
        }
        Ok(())
    }

    fn rel_compare(&mut self, flag_name: &str, flag_bit: u8) -> Result<(), CompileError> {
        self.expression()?;
        self.emit("CMP(SP+, r0)");
        self.emit(&format!("// Test {flag_name} flag"));
        self.emit("FTR(r0)");
        self.emit(&format!("AND(r0, #{flag_bit}, r0)"));
        Ok(())
    }

    fn rel_equals(&mut self) -> Result<(), CompileError> {
        self.match_str("==")?;
        self.rel_compare("EQUAL", 1)
    }

    fn rel_not_equals(&mut self) -> Result<(), CompileError> {
        self.match_str("!=")?;
        self.rel_compare("NOT_EQUAL", 32)
    }

    fn rel_less(&mut self) -> Result<(), CompileError> {
        self.match_char('<')?;
        if self.look == '=' {
            self.match_char('=')?;
            self.rel_compare("LESS_EQUAL", 16)
        } else {
            self.rel_compare("LESS", 8)
        }
    }

    fn rel_greater(&mut self) -> Result<(), CompileError> {
        self.match_char('>')?;
        if self.look == '=' {
            self.match_char('=')?;
            self.rel_compare("GREATER_EQUAL", 4)
        } else {
            self.rel_compare("GREATER", 2)
        }
    }

    fn expression(&mut self) -> Result<(), CompileError> {
        self.skip_white()?;
        if is_add_op(self.look) {
            // unary +/-: seed the left operand with zero
            self.emit("MOV(r0, #0)");
        } else {
            self.term()?;
        }
        while is_add_op(self.look) {
            self.emit("PSH(r0)");
            if self.look == '+' {
                self.match_char('+')?;
                self.term()?;
                self.emit("ADD(SP+, r0, r0)");
            } else {
                self.match_char('-')?;
                self.term()?;
                // subtract the primary register from the popped value
                self.emit("SUB(r0, SP+, r0)");
            }
        }
        Ok(())
    }

    fn term(&mut self) -> Result<(), CompileError> {
        self.factor()?;
        while self.look == '*' || self.look == '/' {
            self.emit("PSH(r0)");
            if self.look == '*' {
                self.match_char('*')?;
                self.factor()?;
                self.emit("MUL(SP+, r0, r0)");
            } else {
                self.match_char('/')?;
                self.factor()?;
                self.emit("DIV(SP+, r0, r0)");
            }
        }
        Ok(())
    }

    fn factor(&mut self) -> Result<(), CompileError> {
        self.skip_white()?;
        if self.look == '(' {
            self.match_char('(')?;
            self.bool_expression()?;
            self.match_char(')')?;
        } else if is_letter(self.look) {
            self.identify()?;
        } else {
            let value = self.get_num()?;
            self.emit(&format!("MOV(r0, #{value})"));
        }
        Ok(())
    }

    fn identify(&mut self) -> Result<(), CompileError> {
        let name = self.get_name()?;
        if self.look == '(' {
            // call syntax is recognized but not implemented
            self.match_char('(')?;
            self.match_char(')')?;
            self.emit(&format!("// TODO call function: {name}"));
            return Ok(());
        }
        let slot = match self.vars.slot(&name) {
            Some(slot) => slot,
            None => {
                return Err(self.error_here(format!("Variable {name} not initialized!")))
            }
        };
        self.emit(&format!("VTR(v{slot}, r0) // Variable {name}"));
        Ok(())
    }
}

/// Strip `//` comments, upper-case, and append the termination sentinel.
fn prepare_source(source: &str) -> String {
    let mut ret = String::new();
    for line in source.split('\n') {
        let line = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        ret.push_str(line);
        ret.push('\n');
    }
    let mut ret = ret.to_uppercase();
    ret.push(SENTINEL);
    ret
}

fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_add_op(c: char) -> bool {
    c == '+' || c == '-'
}

fn is_or_op(c: char) -> bool {
    c == '|' || c == '~'
}

fn is_rel_op(c: char) -> bool {
    matches!(c, '=' | '!' | '<' | '>')
}

#[cfg(test)]
mod tests {
    use super::{translate, translate_with_cancel};
    use crate::scheduler::CancelToken;

    #[test]
    fn var_decl_and_increment() {
        let casm = translate("VAR x = 5\nx = x + 1").expect("translates");
        let expected = "\
MOV(r0, #5)
RTV(r0, v0) // Variable X
VTR(v0, r0) // Variable X
PSH(r0)
MOV(r0, #1)
ADD(SP+, r0, r0)
RTV(r0, v0) // Variable X
";
        assert_eq!(casm, expected);
    }

    #[test]
    fn translation_is_deterministic() {
        let src = "VAR a = 2 * 3 + 4\nIF (a > 5) { a = 0 }";
        let first = translate(src).expect("translates");
        let second = translate(src).expect("translates");
        assert_eq!(first, second);
    }

    #[test]
    fn if_emits_guard_and_label() {
        let casm = translate("IF (1 == 1) { VAR y = 2 }").expect("translates");
        assert!(casm.contains("JIF(l0, NOT_EQUAL)"));
        assert!(casm.contains("LBL(l0)"));
        assert!(casm.contains("AND(r0, #1, r0)"));
        // no else: only one label is minted
        assert!(!casm.contains("l1"));
    }

    #[test]
    fn if_else_mints_two_labels() {
        let casm =
            translate("VAR a\nIF (1 == 2) { a = 1 } ELSE { a = 2 }").expect("translates");
        assert!(casm.contains("JIF(l0, NOT_EQUAL)"));
        assert!(casm.contains("JMP(l1)"));
        assert!(casm.contains("LBL(l0)"));
        assert!(casm.contains("LBL(l1)"));
    }

    #[test]
    fn else_may_stand_in_for_the_closing_brace() {
        let braced =
            translate("VAR a\nIF (1 == 2) { a = 1 } ELSE { a = 2 }").expect("translates");
        let inline =
            translate("VAR a\nIF (1 == 2) { a = 1 ELSE { a = 2 }").expect("translates");
        assert_eq!(braced, inline);
    }

    #[test]
    fn while_emits_loop_frame() {
        let casm = translate("VAR i = 0\nWHILE (i < 3) { i = i + 1 }").expect("translates");
        assert!(casm.contains("LBL(l0)"));
        assert!(casm.contains("JIF(l1, NOT_EQUAL)"));
        assert!(casm.contains("JMP(l0)"));
        assert!(casm.contains("LBL(l1)"));
        assert!(casm.contains("AND(r0, #8, r0)"));
    }

    #[test]
    fn relations_mask_their_flag_bits() {
        let cases = [
            ("==", 1u8),
            (">", 2),
            (">=", 4),
            ("<", 8),
            ("<=", 16),
            ("!=", 32),
        ];
        for (op, bit) in cases {
            let casm = translate(&format!("VAR x = 1 {op} 2")).expect("translates");
            assert!(
                casm.contains(&format!("AND(r0, #{bit}, r0)")),
                "{op} should mask #{bit}:\n{casm}"
            );
        }
    }

    #[test]
    fn negation_inverts_low_byte() {
        let casm = translate("VAR x = !(1 == 2)").expect("translates");
        assert!(casm.contains("MOV(r1, #255)"));
        assert!(casm.contains("XOR(r1, r0, r0)"));
    }

    #[test]
    fn casm_block_passes_through_without_spaces() {
        let casm = translate("CASM { NOP() }").expect("translates");
        assert!(casm.contains("// Start of CASM block"));
        assert!(casm.contains("\nNOP()\n"));
        assert!(casm.contains("// End of CASM block"));
    }

    #[test]
    fn call_syntax_emits_placeholder_only() {
        let casm = translate("VAR x\nx = foo()").expect("translates");
        assert!(casm.contains("// TODO call function: FOO"));
        assert!(!casm.contains("CALL"));
    }

    #[test]
    fn comments_and_case_are_normalized() {
        let casm = translate("var x = 5 // five").expect("translates");
        assert!(casm.contains("RTV(r0, v0) // Variable X"));
    }

    #[test]
    fn undeclared_variable_is_line_numbered() {
        let err = translate("VAR a = 1\nz = 1").expect_err("must fail");
        assert_eq!(err.line, 2);
        assert!(err.message.contains('Z'), "{}", err.message);
        assert!(err.snippet.contains('Z'));
    }

    #[test]
    fn undeclared_read_fails() {
        let err = translate("VAR a = b").expect_err("must fail");
        assert!(err.message.contains("Variable B not initialized!"));
    }

    #[test]
    fn redeclaration_fails() {
        let err = translate("VAR a\nVAR a").expect_err("must fail");
        assert!(err.message.contains("already declared"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn second_slot_goes_to_second_variable() {
        let casm = translate("VAR a, b\nb = 7").expect("translates");
        assert!(casm.contains("RTV(r0, v1) // Variable B"));
    }

    #[test]
    fn missing_close_brace_fails() {
        let err = translate("IF (1 == 1) { VAR a").expect_err("must fail");
        assert!(err.message.contains("Expected }"), "{}", err.message);
    }

    #[test]
    fn extra_close_brace_fails() {
        let err = translate("VAR a\n}").expect_err("must fail");
        assert!(err.message.contains("extra '}'"));
    }

    #[test]
    fn garbage_in_expression_is_line_numbered() {
        let err = translate("VAR a\na = ?").expect_err("must fail");
        assert_eq!(err.line, 2);
        assert!(err.message.contains("Expected integer"));
    }

    #[test]
    fn cancelled_token_aborts() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = translate_with_cancel("VAR a = 1", &cancel).expect_err("must abort");
        assert!(err.is_cancelled());
    }
}
