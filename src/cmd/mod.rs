pub mod platforms;
pub mod resolve;
pub mod serve;
