//! Step guards

use crate::template::value::is_truthy;
use crate::template::{Scope, Template};

/// Guard deciding whether a step runs (`when:`)
#[derive(Debug, Clone)]
pub enum Guard {
    /// `when: true` / `when: false`
    Constant(bool),
    /// Any template or bare expression; coerced by truthiness
    Expression(Template),
}

impl Guard {
    pub fn evaluate(&self, scope: &dyn Scope) -> bool {
        match self {
            Guard::Constant(value) => *value,
            Guard::Expression(template) => is_truthy(&template.evaluate(scope)),
        }
    }

    /// Source text, for logs and skip reasons
    pub fn describe(&self) -> String {
        match self {
            Guard::Constant(value) => value.to_string(),
            Guard::Expression(template) => template.source().to_string(),
        }
    }
}
