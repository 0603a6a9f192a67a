pub mod three_statement;
