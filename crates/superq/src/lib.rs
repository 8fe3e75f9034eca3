#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use superq_model as model;

#[doc(inline)]
pub use superq_nlp as nlp;

#[doc(inline)]
pub use superq_estimator as estimator;

#[doc(inline)]
pub use superq_vis as vis;
