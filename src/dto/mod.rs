pub mod sns_dto;
pub mod webhook_dto;
