// Library entry exposing translator and assembler modules.
pub mod assembler;
pub mod bytecode;
pub mod cli;
pub mod instructions;
pub mod relation;
pub mod reporter;
pub mod scheduler;
pub mod translator;
pub mod var_table;
