pub mod client;
pub mod error;
pub mod http;
pub mod info;
pub mod payment;
pub mod redeem;
pub mod settlement;
pub mod token;

pub use client::PublisherClient;
pub use error::{Result, SdkError};
pub use info::PublisherInfo;
pub use payment::FuturePayment;
pub use redeem::RedeemRequest;
pub use settlement::{SettleRequest, SettleResponse, SettlementStatus};
pub use token::Token;
