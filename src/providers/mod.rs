pub mod binance;
pub mod football_data;
pub mod open_meteo;
pub mod openweather;
pub mod util;
pub mod yahoo_finance;
