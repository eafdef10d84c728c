pub mod mock_tv;
