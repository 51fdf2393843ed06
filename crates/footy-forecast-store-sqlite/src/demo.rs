pub(crate) struct DemoLeague {
    pub name: &'static str,
    pub country: &'static str,
    pub code: &'static str,
    pub teams: &'static [&'static str],
}

pub(crate) const DEMO_LEAGUES: &[DemoLeague] = &[
    DemoLeague {
        name: "Ukrainian Premier League",
        country: "Ukraine",
        code: "UPL",
        teams: &[
            "Dynamo Kyiv",
            "Shakhtar Donetsk",
            "Oleksandriya",
            "Polissya Zhytomyr",
            "Kryvbas Kryvyi Rih",
            "Karpaty Lviv",
            "Zorya Luhansk",
            "Rukh Lviv",
            "Veres Rivne",
            "Kolos Kovalivka",
            "Obolon Kyiv",
            "LNZ Cherkasy",
            "Epitsentr Kamianets-Podilskyi",
            "SC Poltava",
            "Metalist 1925 Kharkiv",
            "Kudrivka",
        ],
    },
    DemoLeague {
        name: "Premier League",
        country: "England",
        code: "EPL",
        teams: &[
            "Arsenal",
            "Manchester City",
            "Liverpool",
            "Chelsea",
            "Tottenham Hotspur",
            "Manchester United",
            "Newcastle United",
            "Aston Villa",
            "West Ham United",
            "Brighton & Hove Albion",
            "Brentford",
            "Wolverhampton Wanderers",
            "Crystal Palace",
            "Everton",
            "Fulham",
            "Nottingham Forest",
            "Leeds United",
            "Burnley",
            "AFC Bournemouth",
            "Southampton",
        ],
    },
    DemoLeague {
        name: "LaLiga",
        country: "Spain",
        code: "LL",
        teams: &[
            "Real Madrid",
            "Barcelona",
            "Atlético Madrid",
            "Real Sociedad",
            "Athletic Club Bilbao",
            "Real Betis",
            "Villarreal",
            "Girona",
            "Valencia",
            "Celta Vigo",
            "Osasuna",
            "Mallorca",
            "Las Palmas",
            "Getafe",
            "Sevilla",
            "Deportivo Alavés",
            "Rayo Vallecano",
            "Real Valladolid",
            "Leganés",
            "Espanyol",
        ],
    },
    DemoLeague {
        name: "Bundesliga",
        country: "Germany",
        code: "BUN",
        teams: &[
            "Bayern Munich",
            "Borussia Dortmund",
            "RB Leipzig",
            "Bayer Leverkusen",
            "Eintracht Frankfurt",
            "VfL Wolfsburg",
            "SC Freiburg",
            "Borussia Mönchengladbach",
            "FC Union Berlin",
            "VfB Stuttgart",
            "Mainz 05",
            "Werder Bremen",
            "FC Augsburg",
            "TSG Hoffenheim",
            "FC Köln",
            "VfL Bochum",
            "Fortuna Düsseldorf",
            "FC St. Pauli",
        ],
    },
    DemoLeague {
        name: "Serie A",
        country: "Italy",
        code: "SA",
        teams: &[
            "Inter Milan",
            "AC Milan",
            "Juventus",
            "Napoli",
            "Roma",
            "Lazio",
            "Atalanta",
            "Fiorentina",
            "Bologna",
            "Torino",
            "Udinese",
            "Monza",
            "Genoa",
            "Cagliari",
            "Empoli",
            "Lecce",
            "Verona",
            "Venezia",
            "Parma",
            "Como",
        ],
    },
    DemoLeague {
        name: "Ligue 1",
        country: "France",
        code: "L1",
        teams: &[
            "Paris Saint-Germain",
            "Olympique de Marseille",
            "AS Monaco",
            "Lille OSC",
            "Olympique Lyonnais",
            "Stade Rennais",
            "RC Lens",
            "OGC Nice",
            "Toulouse",
            "Reims",
            "Montpellier",
            "Nantes",
            "Strasbourg",
            "Brest",
            "Lorient",
            "Metz",
            "Auxerre",
            "Le Havre",
        ],
    },
    DemoLeague {
        name: "Eredivisie",
        country: "Netherlands",
        code: "NED",
        teams: &[
            "Ajax",
            "PSV Eindhoven",
            "Feyenoord",
            "AZ Alkmaar",
            "FC Twente",
            "SC Heerenveen",
            "FC Utrecht",
            "Sparta Rotterdam",
            "NEC Nijmegen",
            "Vitesse",
            "FC Groningen",
            "PEC Zwolle",
            "RKC Waalwijk",
            "Go Ahead Eagles",
            "Fortuna Sittard",
            "Almere City",
            "Heracles Almelo",
            "Excelsior",
        ],
    },
    DemoLeague {
        name: "Primeira Liga",
        country: "Portugal",
        code: "POR",
        teams: &[
            "FC Porto",
            "SL Benfica",
            "Sporting CP",
            "SC Braga",
            "Vitória Guimarães",
            "Boavista",
            "Estoril Praia",
            "Rio Ave",
            "Casa Pia",
            "Gil Vicente",
            "Famalicão",
            "Moreirense",
            "Portimonense",
            "Farense",
            "Vizela",
            "Estrela Amadora",
            "Chaves",
            "Arouca",
        ],
    },
    // National teams are loaded separately; only the competition is seeded.
    DemoLeague {
        name: "Europe - World Cup 2026 Qualifiers",
        country: "Europe",
        code: "UEFA-WCQ26",
        teams: &[],
    },
];

#[cfg(test)]
pub(crate) fn demo_team_count() -> usize {
    DEMO_LEAGUES.iter().map(|league| league.teams.len()).sum()
}
