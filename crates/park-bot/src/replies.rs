use park_types::models::{MemberStatus, Place};

pub const NEW_MEMBER_HINT: &str = "Возвращайтесь через пару дней.";

pub const APOLOGY: &str =
    "Что-то пошло не так. Попробуйте ещё раз /start через некоторое время.";

pub fn greeting(status: MemberStatus) -> String {
    match status {
        MemberStatus::Stranger => "Простите, я вас не знаю.".to_string(),
        MemberStatus::KnownButUntrusted => format!(
            "Вы совсем недавно присоединились к нашему уютному чатику, \
             мне нужно время, чтобы узнать вас получше.\n{}",
            NEW_MEMBER_HINT
        ),
        MemberStatus::KnownAndTrusted => {
            "Привет! Я робот. Я могу помочь вам найти соседей.".to_string()
        }
    }
}

pub fn places(places: &[Place]) -> String {
    match places {
        [] => "Я не знаю где вы живёте.\nЧтобы это исправить, вам нужно \
               в чатик ЖК отправить сообщение вида #Xкорпус #Yэтаж. Например \
               '#3корпус #11этаж'. Минут через пять после этого возвращайтесь \
               и ещё раз нажмите /start."
            .to_string(),
        [place] => format!(
            "Похоже, что вы живёте в {}-м корпусе на {}-м этаже.",
            place.building, place.floor
        ),
        _ => "Какая неожиданность. Похоже вы отправили несколько сообщений \
              с указанием своего этажа. Теперь я не знаю как быть. \
              Попробуйте написать в общий чатик."
            .to_string(),
    }
}

pub fn neighbors(count: usize) -> String {
    match count {
        0 => "Я не знаю ваших соседей, мне очень жаль. \
              Попробуйте зайти ещё когда-нибудь."
            .to_string(),
        _ => "Кажется у вас есть соседи. Сейчас перешлю вам их сообщения.".to_string(),
    }
}
