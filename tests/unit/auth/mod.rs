pub mod test_token_service;
